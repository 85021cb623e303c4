// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory outlet for controller and cache tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::controller::Connector;
use crate::error::{Error, Result, TransportError};
use crate::protocol::PowerSwitch;

#[derive(Debug, Default)]
struct OutletState {
    on: bool,
    connects: u32,
    reads: u32,
    writes: u32,
    failing_connects: u32,
    failing_ops: u32,
    latency: Duration,
}

/// A scriptable outlet shared between the test and the switches it hands out.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeOutlet {
    state: Arc<Mutex<OutletState>>,
}

impl FakeOutlet {
    pub(crate) fn new(on: bool) -> Self {
        let outlet = Self::default();
        outlet.state.lock().on = on;
        outlet
    }

    pub(crate) fn connector(&self) -> FakeConnector {
        FakeConnector {
            outlet: self.clone(),
        }
    }

    pub(crate) fn is_on(&self) -> bool {
        self.state.lock().on
    }

    /// Flips the relay behind the controller's back.
    pub(crate) fn set_on(&self, on: bool) {
        self.state.lock().on = on;
    }

    pub(crate) fn connects(&self) -> u32 {
        self.state.lock().connects
    }

    pub(crate) fn reads(&self) -> u32 {
        self.state.lock().reads
    }

    pub(crate) fn writes(&self) -> u32 {
        self.state.lock().writes
    }

    /// Makes the next `n` connection attempts fail.
    pub(crate) fn fail_connects(&self, n: u32) {
        self.state.lock().failing_connects = n;
    }

    /// Makes the next `n` reads or writes fail.
    pub(crate) fn fail_ops(&self, n: u32) {
        self.state.lock().failing_ops = n;
    }

    /// Delays every read and write.
    pub(crate) fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = latency;
    }

    fn take_failure(&self) -> Option<Error> {
        let mut state = self.state.lock();
        (state.failing_ops > 0).then(|| {
            state.failing_ops -= 1;
            TransportError::ConnectionClosed.into()
        })
    }

    fn latency(&self) -> Duration {
        self.state.lock().latency
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeConnector {
    outlet: FakeOutlet,
}

impl Connector for FakeConnector {
    type Switch = FakeSwitch;

    async fn connect(&self) -> Result<FakeSwitch> {
        let mut state = self.outlet.state.lock();
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(Error::connect(
                "fake",
                TransportError::Timeout(Duration::from_secs(1)).into(),
            ));
        }
        state.connects += 1;
        Ok(FakeSwitch {
            outlet: self.outlet.clone(),
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeSwitch {
    outlet: FakeOutlet,
}

impl PowerSwitch for FakeSwitch {
    async fn get_status(&mut self) -> Result<bool> {
        tokio::time::sleep(self.outlet.latency()).await;
        if let Some(e) = self.outlet.take_failure() {
            return Err(e);
        }
        let mut state = self.outlet.state.lock();
        state.reads += 1;
        Ok(state.on)
    }

    async fn set_status(&mut self, on: bool) -> Result<()> {
        tokio::time::sleep(self.outlet.latency()).await;
        if let Some(e) = self.outlet.take_failure() {
            return Err(e);
        }
        let mut state = self.outlet.state.lock();
        state.writes += 1;
        state.on = on;
        Ok(())
    }
}
