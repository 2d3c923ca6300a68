//! Scripted transport for bridge and adapter tests

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::SoftBuffer;
use crate::config::SessionConfig;
use crate::error::NetworkError;
use crate::network::transport::{NetTransport, SessionParams, SyncOutcome};

/// What one cycle does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Sync,
    Miss,
    FailSync,
    FailData,
    FailSendSync,
    FailSendData,
}

#[derive(Debug)]
pub struct MockState {
    pub script: VecDeque<Step>,
    pub fail_handshake: bool,
    /// Overrides what the master answers in the handshake
    pub negotiated: Option<SessionParams>,
    pub ratio: (u64, u64),
    pub capture_value: f32,
    pub last_playback: Vec<f32>,
    pub pace: Duration,

    pub handshakes: usize,
    pub syncs_received: usize,
    pub data_received: usize,
    pub syncs_sent: usize,
    pub data_sent: usize,
    pub closes: usize,

    current: Step,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            script: VecDeque::new(),
            fail_handshake: false,
            negotiated: None,
            ratio: (1, 1),
            capture_value: 0.5,
            last_playback: Vec::new(),
            pace: Duration::from_millis(1),
            handshakes: 0,
            syncs_received: 0,
            data_received: 0,
            syncs_sent: 0,
            data_sent: 0,
            closes: 0,
            current: Step::Sync,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockTransport {
    pub state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(steps: &[Step]) -> Self {
        let mock = Self::new();
        mock.state.lock().script.extend(steps.iter().copied());
        mock
    }

    /// Unpaced, for tests that drive cycles by hand.
    pub fn unpaced(steps: &[Step]) -> Self {
        let mock = Self::with_script(steps);
        mock.state.lock().pace = Duration::ZERO;
        mock
    }
}

impl NetTransport for MockTransport {
    fn handshake(&mut self, config: &SessionConfig) -> Result<SessionParams, NetworkError> {
        let mut state = self.state.lock();
        state.handshakes += 1;
        if state.fail_handshake {
            return Err(NetworkError::HandshakeFailed("no master".into()));
        }
        Ok(state
            .negotiated
            .clone()
            .unwrap_or_else(|| SessionParams::proposal(config)))
    }

    fn recv_sync(&mut self) -> Result<SyncOutcome, NetworkError> {
        let pace = {
            let mut state = self.state.lock();
            state.syncs_received += 1;
            state.current = state.script.pop_front().unwrap_or(Step::Sync);
            state.pace
        };
        if !pace.is_zero() {
            std::thread::sleep(pace);
        }

        match self.state.lock().current {
            Step::FailSync => Err(NetworkError::Timeout),
            Step::Miss => Ok(SyncOutcome::Missed),
            _ => Ok(SyncOutcome::Received),
        }
    }

    fn recv_data(&mut self, capture: &mut SoftBuffer) -> Result<(), NetworkError> {
        let mut state = self.state.lock();
        if state.current == Step::FailData {
            return Err(NetworkError::ReceiveFailed("truncated packet".into()));
        }
        state.data_received += 1;
        for channel in capture.iter_channels_mut() {
            channel.fill(state.capture_value);
        }
        Ok(())
    }

    fn resample_factor(&self) -> (u64, u64) {
        self.state.lock().ratio
    }

    fn send_sync(&mut self) -> Result<(), NetworkError> {
        let mut state = self.state.lock();
        if state.current == Step::FailSendSync {
            return Err(NetworkError::SendFailed("sync".into()));
        }
        state.syncs_sent += 1;
        Ok(())
    }

    fn send_data(&mut self, playback: &SoftBuffer) -> Result<(), NetworkError> {
        let mut state = self.state.lock();
        if state.current == Step::FailSendData {
            return Err(NetworkError::SendFailed("data".into()));
        }
        state.data_sent += 1;
        state.last_playback = playback.channel(0).map(<[f32]>::to_vec).unwrap_or_default();
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}
