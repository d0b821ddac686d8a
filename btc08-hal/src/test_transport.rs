//! In-memory [`Transport`] that plays back scripted responses (spec §4.3
//! "test-mode harness"), so the chain controller's init, BIST-poll and
//! golden-nonce paths can be exercised without real silicon.

extern crate std;

use std::collections::VecDeque;
use std::vec::Vec;

use crate::transport::{FrameIo, Transport};

#[derive(Debug, PartialEq, Eq)]
pub struct MockError;

/// Plays back a fixed script of responses in order; each `transfer` /
/// `transfer_fast` call pops the next one. Panics-free: an exhausted script
/// surfaces as [`MockError`], same as a real transport failure.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: VecDeque<Vec<u8>>,
    /// Every `tx` buffer seen, in order, for assertions in tests.
    pub sent: Vec<Vec<u8>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the bytes to hand back on the next transfer call.
    pub fn push_response(&mut self, bytes: &[u8]) {
        self.responses.push_back(bytes.to_vec());
    }
}

impl Transport for MockTransport {
    type Error = MockError;

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error> {
        self.sent.push(tx.to_vec());
        let resp = self.responses.pop_front().ok_or(MockError)?;
        let n = rx.len().min(resp.len());
        rx[..n].copy_from_slice(&resp[..n]);
        for b in rx[n..].iter_mut() {
            *b = 0xFF;
        }
        Ok(())
    }

    fn transfer_fast(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Self::Error> {
        if tx.len() % 4 != 0 || rx.len() % 4 != 0 {
            return Err(MockError);
        }
        self.transfer(tx, rx)
    }

    fn transfer_batch(&mut self, frames: &mut [FrameIo<'_>]) -> Result<(), Self::Error> {
        for frame in frames.iter_mut() {
            self.transfer(frame.tx, frame.rx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plays_back_queued_responses_in_order() {
        let mut t = MockTransport::new();
        t.push_response(&[0xAA, 0xBB]);
        t.push_response(&[0xCC, 0xDD]);

        let mut rx = [0u8; 2];
        t.transfer(&[0x00, 0x00], &mut rx).unwrap();
        assert_eq!(rx, [0xAA, 0xBB]);
        t.transfer(&[0x00, 0x00], &mut rx).unwrap();
        assert_eq!(rx, [0xCC, 0xDD]);
        assert!(t.transfer(&[0x00, 0x00], &mut rx).is_err());
    }

    #[test]
    fn fast_path_rejects_unaligned_length() {
        let mut t = MockTransport::new();
        t.push_response(&[0u8; 5]);
        let mut rx = [0u8; 5];
        assert_eq!(t.transfer_fast(&[0u8; 5], &mut rx), Err(MockError));
    }
}
