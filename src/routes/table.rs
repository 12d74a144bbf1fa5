use super::{FlagPlacement, HttpMethod, Placement, RouteDescriptor};
use crate::mfa::SensitiveKind;

/// Session-scoped organization flag. Always sent as a query parameter.
pub const CURRENT_ORGANIZATION_FLAG: &str = "organization_id";

/// Flags that stay in the query on routes whose other flags go to the body.
const MODE_ONLY: &[&str] = &["mode"];

fn get(resource: &'static str, action: &'static str, path: &'static str, description: &'static str) -> RouteDescriptor {
    RouteDescriptor::new(resource, action, HttpMethod::Get, path, description)
}

fn post(resource: &'static str, action: &'static str, path: &'static str, description: &'static str) -> RouteDescriptor {
    RouteDescriptor::new(resource, action, HttpMethod::Post, path, description)
}

fn patch(resource: &'static str, action: &'static str, path: &'static str, description: &'static str) -> RouteDescriptor {
    RouteDescriptor::new(resource, action, HttpMethod::Patch, path, description)
}

fn put(resource: &'static str, action: &'static str, path: &'static str, description: &'static str) -> RouteDescriptor {
    RouteDescriptor::new(resource, action, HttpMethod::Put, path, description)
}

fn delete(resource: &'static str, action: &'static str, path: &'static str, description: &'static str) -> RouteDescriptor {
    RouteDescriptor::new(resource, action, HttpMethod::Delete, path, description)
}

/// The downstream wire contract, in catalog order.
pub fn builtin_routes() -> Vec<RouteDescriptor> {
    vec![
        // Accounts
        get("accounts", "list", "/v2/accounts", "List accounts"),
        get("accounts", "show", "/v2/accounts/{id}", "Show an account"),
        post("accounts", "create", "/v2/accounts", "Open a new account"),
        patch("accounts", "update", "/v2/accounts/{id}", "Update an account's description"),
        get("accounts", "movements", "/v2/accounts/{id}/movements", "List movements of an account"),
        get("accounts", "statement", "/v2/accounts/{id}/statement", "Download an account statement").binary(),

        // Account numbers
        get("account_numbers", "list", "/v2/account_numbers", "List account numbers"),
        get("account_numbers", "show", "/v2/account_numbers/{id}", "Show an account number"),
        post("account_numbers", "create", "/v2/account_numbers", "Create an account number"),
        patch("account_numbers", "update", "/v2/account_numbers/{id}", "Update an account number"),

        // Account verifications
        get("account_verifications", "list", "/v2/account_verifications", "List account verifications"),
        get("account_verifications", "show", "/v2/account_verifications/{id}", "Show an account verification"),
        post("account_verifications", "create", "/v2/account_verifications", "Verify a counterparty account"),

        // Entities
        get("entities", "list", "/v2/entities", "List legal entities"),
        get("entities", "show", "/v2/entities/{id}", "Show a legal entity"),

        // Transfers
        get("transfers", "list", "/v2/transfers", "List transfers"),
        get("transfers", "show", "/v2/transfers/{id}", "Show a transfer"),
        post("transfers", "create", "/v2/transfers", "Send an outbound transfer")
            .query_flags(MODE_ONLY)
            .sensitive(SensitiveKind::CreateTransfer),
        post("transfers", "return", "/v2/transfers/{id}/return", "Return an inbound transfer")
            .query_flags(MODE_ONLY),

        // Simulation (test mode only)
        post("simulate", "receive_transfer", "/v2/simulate/receive_transfer", "Simulate an inbound transfer")
            .placement(FlagPlacement::All(Placement::Body)),

        // Payment intents
        get("payment_intents", "list", "/v1/payment_intents", "List payment intents"),
        get("payment_intents", "show", "/v1/payment_intents/{id}", "Show a payment intent"),
        post("payment_intents", "create", "/v1/payment_intents", "Create a payment intent"),

        // Checkout sessions
        get("checkout_sessions", "show", "/v1/checkout_sessions/{id}", "Show a checkout session"),
        post("checkout_sessions", "create", "/v1/checkout_sessions", "Create a checkout session"),
        post("checkout_sessions", "expire", "/v1/checkout_sessions/{id}/expire", "Expire an open checkout session"),

        // Refunds
        get("refunds", "list", "/v1/refunds", "List refunds"),
        get("refunds", "show", "/v1/refunds/{id}", "Show a refund"),
        post("refunds", "create", "/v1/refunds", "Refund a payment")
            .query_flags(MODE_ONLY)
            .sensitive(SensitiveKind::CreateRefund),

        // Subscriptions
        get("subscriptions", "list", "/v1/subscriptions", "List subscriptions"),
        get("subscriptions", "show", "/v1/subscriptions/{id}", "Show a subscription"),
        put("subscriptions", "replace_plan", "/v1/subscriptions/{id}/plan", "Replace a subscription's plan"),

        // Charges
        get("charges", "list", "/v1/charges", "List charges"),
        get("charges", "show", "/v1/charges/{id}", "Show a charge"),
        post("charges", "create", "/v1/charges", "Create a charge"),

        // Bank links
        get("links", "list", "/v1/links", "List bank links"),
        get("links", "show", "/v1/links/{id}", "Show a bank link"),
        patch("links", "update", "/v1/links/{id}", "Activate or deactivate a bank link"),
        post("links", "exchange", "/v1/links/exchange", "Exchange a widget token for a link")
            .placement(FlagPlacement::All(Placement::Query)),
        delete("links", "delete", "/v1/links/{id}", "Delete a bank link")
            .query_flags(MODE_ONLY)
            .sensitive(SensitiveKind::DeleteLink),

        // Webhook endpoints
        get("webhook_endpoints", "list", "/v1/webhook_endpoints", "List webhook endpoints"),
        get("webhook_endpoints", "show", "/v1/webhook_endpoints/{id}", "Show a webhook endpoint"),
        post("webhook_endpoints", "create", "/v1/webhook_endpoints", "Create a webhook endpoint"),
        patch("webhook_endpoints", "update", "/v1/webhook_endpoints/{id}", "Update a webhook endpoint"),
        delete("webhook_endpoints", "delete", "/v1/webhook_endpoints/{id}", "Delete a webhook endpoint")
            .query_flags(MODE_ONLY)
            .sensitive(SensitiveKind::DeleteWebhookEndpoint),

        // Team
        get("team_members", "list", "/v1/team_members", "List team members"),
        get("team_members", "show", "/v1/team_members/{id}", "Show a team member"),
        post("team_members", "invite", "/v1/team_members/invitations", "Invite a team member")
            .sensitive(SensitiveKind::InviteTeamMember),
        post("team_members", "disable", "/v1/team_members/{id}/disable", "Disable a team member")
            .sensitive(SensitiveKind::DisableTeamMember),

        // Organizations
        get("organizations", "list", "/v1/organizations", "List organizations available to the session"),
        get("organizations", "current", "/v1/organizations/current", "Show the current organization"),

        // Invoices
        get("invoices", "list", "/v1/invoices", "List invoices"),
        get("invoices", "show", "/v1/invoices/{id}", "Show an invoice"),
        get("invoices", "download", "/v1/invoices/{id}/pdf", "Download an invoice PDF").binary(),

        // Passcode delivery, driven by the MFA gate only
        post("otp", "send", "/v1/otp/send", "Send a one-time passcode for a staged action")
            .internal(),
    ]
}
