// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local protocol client with bounded retries.

use serde_json::Value;
use tracing::{Instrument, Span};

use super::client::{EnergyReading, LocalClient, LocalConfig, energy_reading, switch_state};
use crate::error::{DeviceError, Error, Result};
use crate::protocol::{PowerSwitch, RetryPolicy};
use crate::types::PowerState;

#[derive(Debug, Clone, Copy)]
enum Operation {
    GetStatus,
    SetStatus(bool),
    Energy,
}

impl Operation {
    fn name(self) -> String {
        match self {
            Self::GetStatus => "get_status".to_string(),
            Self::SetStatus(on) => format!("set_status({})", PowerState::from(on)),
            Self::Energy => "energy".to_string(),
        }
    }
}

enum Outcome {
    Status(bool),
    Set,
    Energy(EnergyReading),
}

/// Local protocol client that retries.
///
/// Both construction and every operation run under a [`RetryPolicy`]
/// (3 attempts, 2 s apart by default). A failed attempt drops the session,
/// so the next attempt reconnects and re-probes the device before retrying
/// the operation. When the budget runs out the last failure is returned
/// inside [`DeviceError::RetriesExhausted`].
///
/// # Examples
///
/// ```no_run
/// use psucontrol_outlet::protocol::{PowerSwitch, RetryPolicy};
/// use psucontrol_outlet::protocol::local::{LocalConfig, RobustLocalClient};
/// use psucontrol_outlet::types::LocalVersion;
///
/// # async fn example() -> psucontrol_outlet::Result<()> {
/// let config = LocalConfig::new(
///     "192.168.1.60",
///     "bf0123456789abcdefgh",
///     "0123456789abcdef",
///     LocalVersion::V34,
/// )?;
/// let mut plug =
///     RobustLocalClient::connect(config, RetryPolicy::default(), tracing::Span::none()).await?;
/// plug.turn_on().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RobustLocalClient {
    client: LocalClient,
    policy: RetryPolicy,
    span: Span,
}

impl RobustLocalClient {
    /// Connects and probes the device, retrying per `policy`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::RetriesExhausted` wrapping the last failure.
    pub async fn connect(config: LocalConfig, policy: RetryPolicy, span: Span) -> Result<Self> {
        let mut client = Self {
            client: LocalClient::new(config).with_span(span.clone()),
            policy,
            span,
        };
        let span = client.span.clone();
        client.connect_with_retry().instrument(span).await?;
        Ok(client)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LocalConfig {
        self.client.config()
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns true if a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Reads the energy meter data points, with retries.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::RetriesExhausted` wrapping the last failure.
    pub async fn energy(&mut self) -> Result<EnergyReading> {
        match self.run(Operation::Energy).await? {
            Outcome::Energy(reading) => Ok(reading),
            Outcome::Status(_) | Outcome::Set => Err(unexpected_outcome()),
        }
    }

    async fn connect_with_retry(&mut self) -> Result<()> {
        let address = self.client.config().address();
        let attempts = self.policy.max_attempts();
        let mut attempt = 1;
        loop {
            tracing::info!(address = %address, attempt, attempts, "Connecting to local outlet");
            match self.connect_and_probe().await {
                Ok(reply) => {
                    tracing::info!(address = %address, reply = %reply, "Connection test passed");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Connection attempt failed");
                    self.client.disconnect();
                    self.backoff(attempt, "connect", e).await?;
                }
            }
            attempt += 1;
        }
    }

    /// Opens a fresh session and checks the device answers a status query.
    async fn connect_and_probe(&mut self) -> Result<Value> {
        self.client.disconnect();
        self.client.status().await
    }

    /// Waits before the next attempt, or fails once the budget is spent.
    async fn backoff(&self, attempt: u32, operation: &str, error: Error) -> Result<()> {
        if !self.policy.should_retry(attempt) || !error.is_transient() {
            return Err(DeviceError::RetriesExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                source: Box::new(error),
            }
            .into());
        }
        let delay = self.policy.delay_for_attempt(attempt);
        tracing::info!(operation, delay = ?delay, "Retrying");
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn run(&mut self, operation: Operation) -> Result<Outcome> {
        let span = self.span.clone();
        async {
            let mut attempt = 1;
            loop {
                match self.attempt(operation).await {
                    Ok(outcome) => return Ok(outcome),
                    Err(e) => {
                        tracing::warn!(
                            operation = %operation.name(),
                            attempt,
                            error = %e,
                            "Operation attempt failed"
                        );
                        self.client.disconnect();
                        self.backoff(attempt, &operation.name(), e).await?;
                    }
                }
                attempt += 1;
            }
        }
        .instrument(span)
        .await
    }

    async fn attempt(&mut self, operation: Operation) -> Result<Outcome> {
        if !self.client.is_connected() {
            self.connect_and_probe().await?;
        }
        let address = self.client.config().address();
        match operation {
            Operation::GetStatus => {
                tracing::info!(address = %address, "Getting status from local outlet");
                let reply = self.client.status().await?;
                let on = switch_state(&reply)?;
                tracing::info!(dps = %reply, "Local outlet is {}", PowerState::from(on));
                Ok(Outcome::Status(on))
            }
            Operation::SetStatus(on) => {
                let state = PowerState::from(on);
                tracing::info!(address = %address, "Setting local outlet to {state}");
                self.client.set_status(on).await?;
                tracing::info!("Local outlet set to {state}");
                Ok(Outcome::Set)
            }
            Operation::Energy => {
                let reply = self.client.status().await?;
                Ok(Outcome::Energy(energy_reading(&reply)?))
            }
        }
    }
}

fn unexpected_outcome() -> Error {
    crate::error::ProtocolError::UnexpectedPayload("mismatched operation outcome".to_string())
        .into()
}

impl PowerSwitch for RobustLocalClient {
    async fn get_status(&mut self) -> Result<bool> {
        match self.run(Operation::GetStatus).await? {
            Outcome::Status(on) => Ok(on),
            Outcome::Set | Outcome::Energy(_) => Err(unexpected_outcome()),
        }
    }

    async fn set_status(&mut self, on: bool) -> Result<()> {
        match self.run(Operation::SetStatus(on)).await? {
            Outcome::Set => Ok(()),
            Outcome::Status(_) | Outcome::Energy(_) => Err(unexpected_outcome()),
        }
    }
}
