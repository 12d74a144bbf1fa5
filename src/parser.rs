//! Command parser
//!
//! Turns `[finops] <resource> <action> [<id>] [--<flag> [<value>]]*` into a
//! [`ParsedCommand`]. Parsing is total: every input string yields a command,
//! possibly with empty resource/action.

use crate::models::ParsedCommand;
use serde_json::{Map, Value};
use tracing::debug;

/// Program name dropped when it leads the command.
pub const PROGRAM_NAME: &str = "finops";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn bare(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    fn is_flag(&self) -> bool {
        !self.quoted && self.text.starts_with("--")
    }
}

/// Parse a flat command string.
pub fn parse(text: &str) -> ParsedCommand {
    let command = parse_tokens(tokenize(text));
    debug!(
        resource = %command.resource,
        action = %command.action,
        has_id = command.id.is_some(),
        flag_count = command.flags.len(),
        "Parsed command"
    );
    command
}

/// Parse arguments that were already split by a shell.
pub fn parse_args<I, S>(args: I) -> ParsedCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parse_tokens(args.into_iter().map(|arg| Token::bare(arg.into())).collect())
}

/// Split on whitespace. A quote opening a token runs to the matching quote
/// and is stripped; quotes inside a word are literal. No escapes.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        if let Some(q) = quote {
            if ch == q {
                tokens.push(Token {
                    text: std::mem::take(&mut current),
                    quoted: true,
                });
                quote = None;
            } else {
                current.push(ch);
            }
            continue;
        }

        if ch.is_whitespace() {
            if in_word {
                tokens.push(Token::bare(std::mem::take(&mut current)));
                in_word = false;
            }
        } else if !in_word && (ch == '"' || ch == '\'') {
            quote = Some(ch);
        } else {
            current.push(ch);
            in_word = true;
        }
    }

    // Unterminated quote keeps the rest of the input
    if quote.is_some() {
        tokens.push(Token {
            text: current,
            quoted: true,
        });
    } else if in_word {
        tokens.push(Token::bare(current));
    }

    tokens
}

fn parse_tokens(tokens: Vec<Token>) -> ParsedCommand {
    let mut iter = tokens.into_iter().peekable();

    if iter
        .peek()
        .is_some_and(|t| !t.quoted && t.text.eq_ignore_ascii_case(PROGRAM_NAME))
    {
        iter.next();
    }

    let mut command = ParsedCommand::default();

    if let Some(token) = iter.next_if(|t| !t.is_flag()) {
        command.resource = token.text;
        if let Some(token) = iter.next_if(|t| !t.is_flag()) {
            command.action = token.text;
        }
    }

    while let Some(token) = iter.next() {
        if token.is_flag() {
            let name = &token.text[2..];
            if name.is_empty() {
                continue;
            }
            let value = match iter.next_if(|next| !next.is_flag()) {
                Some(next) => coerce(next),
                None => Value::Bool(true),
            };
            insert_path(&mut command.flags, name, value);
        } else if command.id.is_none() {
            command.id = Some(token.text);
        }
    }

    command
}

/// Digits become numbers, `[`/`{` literals become JSON when they parse.
/// Quoted values always stay strings.
fn coerce(token: Token) -> Value {
    if token.quoted {
        return Value::String(token.text);
    }

    let raw = token.text;

    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        return match raw.parse::<u64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(raw),
        };
    }

    if raw.starts_with('[') || raw.starts_with('{') {
        if let Ok(structured) = serde_json::from_str::<Value>(&raw) {
            return structured;
        }
    }

    Value::String(raw)
}

/// Insert `a.b.c` as nested maps. Last write wins: a scalar sitting on a
/// prefix is replaced by a map, and a later scalar replaces a map.
fn insert_path(flags: &mut Map<String, Value>, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut cursor = flags;
    for segment in parents {
        let entry = cursor
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        cursor = next;
    }

    cursor.insert(last.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_show_transfer_command() {
        let command = parse("transfers show txn_42 --mode live");

        assert_eq!(command.resource, "transfers");
        assert_eq!(command.action, "show");
        assert_eq!(command.id.as_deref(), Some("txn_42"));
        assert_eq!(Value::Object(command.flags), json!({"mode": "live"}));
    }

    #[test]
    fn test_program_name_is_dropped() {
        let command = parse("finops accounts list --limit 5");
        assert_eq!(command.resource, "accounts");
        assert_eq!(command.action, "list");
        assert_eq!(command.flags.get("limit"), Some(&json!(5)));
    }

    #[test]
    fn test_dotted_flags_nest() {
        let command = parse("transfers create --a.b.c value --counterparty.account_number 12345");
        assert_eq!(
            Value::Object(command.flags),
            json!({
                "a": {"b": {"c": "value"}},
                "counterparty": {"account_number": 12345}
            })
        );
    }

    #[test]
    fn test_numeric_coercion() {
        let command = parse("entities create --amount 123 --tax_id 12.345.678-9 --ref 12-34");
        assert_eq!(command.flags.get("amount"), Some(&json!(123)));
        assert_eq!(command.flags.get("tax_id"), Some(&json!("12.345.678-9")));
        assert_eq!(command.flags.get("ref"), Some(&json!("12-34")));
    }

    #[test]
    fn test_digits_too_large_stay_string() {
        let command = parse("x y --n 123456789012345678901234567890");
        assert_eq!(
            command.flags.get("n"),
            Some(&json!("123456789012345678901234567890"))
        );
    }

    #[test]
    fn test_structured_literals() {
        let command = parse(r#"webhook_endpoints create --enabled_events ["link.created","refund.succeeded"] --meta {broken"#);
        assert_eq!(
            command.flags.get("enabled_events"),
            Some(&json!(["link.created", "refund.succeeded"]))
        );
        assert_eq!(command.flags.get("meta"), Some(&json!("{broken")));
    }

    #[test]
    fn test_boolean_flags() {
        let command = parse("accounts list --verbose --mode test --dry-run");
        assert_eq!(command.flags.get("verbose"), Some(&json!(true)));
        assert_eq!(command.flags.get("mode"), Some(&json!("test")));
        assert_eq!(command.flags.get("dry-run"), Some(&json!(true)));
    }

    #[test]
    fn test_quoted_values() {
        let command = parse(r#"transfers create --comment "rent for march" --reference '00042'"#);
        assert_eq!(command.flags.get("comment"), Some(&json!("rent for march")));
        assert_eq!(command.flags.get("reference"), Some(&json!("00042")));
    }

    #[test]
    fn test_quoted_value_starting_with_dashes_is_not_a_flag() {
        let command = parse(r#"transfers create --comment "--not a flag""#);
        assert_eq!(command.flags.get("comment"), Some(&json!("--not a flag")));
    }

    #[test]
    fn test_apostrophe_inside_word_is_literal() {
        let command = parse("transfers create --comment don't");
        assert_eq!(command.flags.get("comment"), Some(&json!("don't")));
    }

    #[test]
    fn test_extra_positionals_are_ignored() {
        let command = parse("transfers show txn_1 txn_2 --mode live txn_3");
        assert_eq!(command.id.as_deref(), Some("txn_1"));
        assert_eq!(command.flags.len(), 1);
    }

    #[test]
    fn test_scalar_then_nested_collision_last_wins() {
        let command = parse("x y --a 1 --a.b 2");
        assert_eq!(Value::Object(command.flags), json!({"a": {"b": 2}}));

        let command = parse("x y --a.b 2 --a 1");
        assert_eq!(Value::Object(command.flags), json!({"a": 1}));
    }

    #[test]
    fn test_bare_double_dash_is_ignored() {
        let command = parse("transfers show -- txn_9");
        assert_eq!(command.id.as_deref(), Some("txn_9"));
        assert!(command.flags.is_empty());
    }

    #[test]
    fn test_parse_args_matches_parse() {
        let from_args = parse_args(["finops", "transfers", "show", "txn_42", "--mode", "live"]);
        assert_eq!(from_args, parse("finops transfers show txn_42 --mode live"));
    }

    #[test]
    fn test_parse_is_total() {
        let inputs = [
            "",
            "   ",
            "\"",
            "'unterminated value",
            "--",
            "-- -- --",
            "--a.",
            "--.",
            "finops",
            "ñandú 💸 --💰 ∞",
            "a b --c.d.e",
            "\t\n transfers\tlist\n",
        ];

        for input in inputs {
            let _ = parse(input);
        }

        assert_eq!(parse("").resource, "");
        assert_eq!(parse("'unterminated value").resource, "unterminated value");
        assert_eq!(
            parse("a b --c.d.e").flags.get("c"),
            Some(&json!({"d": {"e": true}}))
        );
    }
}
