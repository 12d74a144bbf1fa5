#![allow(dead_code)]

use financial_command_gateway::agent::Orchestrator;
use financial_command_gateway::config::GatewayConfig;
use financial_command_gateway::error::GatewayError;
use financial_command_gateway::transport::{Transport, TransportRequest, TransportResponse};
use financial_command_gateway::Result;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Transport that records every request and answers from a script.
/// Unscripted calls get `200 {}`.
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<TransportRequest>>,
    responses: Mutex<VecDeque<Result<TransportResponse>>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(TransportResponse::json(status, body)));
    }

    pub fn fail(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(GatewayError::Transport(message.to_string())));
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::json(200, json!({}))))
    }
}

pub fn orchestrator(transport: &Arc<RecordingTransport>) -> Orchestrator {
    orchestrator_with(transport, GatewayConfig::default())
}

pub fn orchestrator_with(transport: &Arc<RecordingTransport>, config: GatewayConfig) -> Orchestrator {
    let transport: Arc<dyn Transport> = transport.clone();
    Orchestrator::with_transport(transport, &config)
}
