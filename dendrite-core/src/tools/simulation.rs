//! Simulation launcher
//!
//! Launches a circuit simulation on the compute backend. Simulations
//! consume paid compute, so every call must be accepted by the thread
//! owner before it runs.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::{ExecutionContext, Tool};

const DEFAULT_DURATION_MS: u64 = 1000;
const MAX_DURATION_MS: u64 = 60_000;

#[derive(Debug, Deserialize)]
struct Input {
    /// Identifier of the circuit to simulate; must be a UUID
    circuit_id: String,
    /// Simulated biological time in milliseconds
    #[serde(default)]
    duration_ms: Option<u64>,
}

pub struct RunSimulationTool;

#[async_trait]
impl Tool for RunSimulationTool {
    fn name(&self) -> &'static str {
        "run_simulation"
    }

    fn name_frontend(&self) -> &'static str {
        "Run Simulation"
    }

    fn description(&self) -> &'static str {
        "Launch a simulation of a reconstructed circuit on the compute backend"
    }

    fn utterances(&self) -> &'static [&'static str] {
        &[
            "run a simulation of this circuit",
            "simulate the thalamus microcircuit for 2 seconds",
            "launch the simulation",
        ]
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "circuit_id": {
                    "type": "string",
                    "format": "uuid",
                    "description": "Circuit to simulate"
                },
                "duration_ms": {
                    "type": "integer",
                    "description": "Simulated time in milliseconds",
                    "default": DEFAULT_DURATION_MS,
                    "maximum": MAX_DURATION_MS
                }
            },
            "required": ["circuit_id"]
        })
    }

    fn requires_validation(&self) -> bool {
        true
    }

    fn validate_input(&self, input: &serde_json::Value) -> Result<()> {
        let parsed: Input = serde_json::from_value(input.clone())
            .map_err(|e| Error::Validation(format!("invalid run_simulation input: {}", e)))?;

        if Uuid::parse_str(&parsed.circuit_id).is_err() {
            return Err(Error::Validation(format!(
                "circuit_id must be a UUID, got '{}'",
                parsed.circuit_id
            )));
        }
        if let Some(duration) = parsed.duration_ms {
            if duration == 0 || duration > MAX_DURATION_MS {
                return Err(Error::Validation(format!(
                    "duration_ms must be between 1 and {}",
                    MAX_DURATION_MS
                )));
            }
        }
        Ok(())
    }

    async fn is_online(&self, ctx: &ExecutionContext) -> bool {
        ctx.client()
            .get(ctx.url("simulation/health"))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn execute(
        &self,
        ctx: &ExecutionContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.validate_input(&input)?;
        let input: Input = serde_json::from_value(input)?;
        let duration_ms = input.duration_ms.unwrap_or(DEFAULT_DURATION_MS);

        let url = ctx.url(&format!(
            "simulation/circuits/{}/runs",
            urlencoding::encode(&input.circuit_id)
        ));

        let body = serde_json::json!({
            "duration_ms": duration_ms,
            "virtual_lab_id": ctx.scope.virtual_lab_id,
            "project_id": ctx.scope.project_id,
        });

        let response = ctx
            .client()
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("simulation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "simulation backend returned {}",
                response.status()
            )));
        }

        let run: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed simulation response: {}", e)))?;

        tracing::info!(circuit_id = %input.circuit_id, duration_ms, "Simulation launched");

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_non_uuid_circuit() {
        let tool = RunSimulationTool;
        let err = tool
            .validate_input(&serde_json::json!({"circuit_id": "not-a-uuid"}))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_validate_accepts_uuid_circuit() {
        let tool = RunSimulationTool;
        let input = serde_json::json!({
            "circuit_id": "5a3f1a66-46b1-4e9e-8e8c-3f86f54be0e1",
            "duration_ms": 2000
        });
        assert!(tool.validate_input(&input).is_ok());
    }

    #[test]
    fn test_validate_duration_bounds() {
        let tool = RunSimulationTool;
        let err = tool
            .validate_input(&serde_json::json!({
                "circuit_id": "5a3f1a66-46b1-4e9e-8e8c-3f86f54be0e1",
                "duration_ms": 0
            }))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
