//! Delivery of received messages and transfer outcomes to the application.

use crate::address::Address;
use crate::protocol::TpResult;

/// Application-side notifications.
///
/// All methods default to no-ops, so an implementation only spells out the
/// events it cares about. For the common closure cases wrap the closure in
/// [`SimpleCallback`] or [`AdvancedCallback`] instead of implementing the
/// trait by hand.
pub trait TransportCallback {
    /// A reception finished. On [`TpResult::Ok`] `data` holds the complete
    /// message; on every other result it is empty and `result` names what
    /// went wrong. `N_USData.indication` in ISO terms.
    fn indication(&mut self, address: &Address, data: &[u8], result: TpResult) {
        let _ = (address, data, result);
    }

    /// Outcome of a transfer started with `send`. `N_USData.confirm`.
    fn confirm(&mut self, address: &Address, result: TpResult) {
        let _ = (address, result);
    }

    /// A first frame arrived and a reception of `declared_len` bytes was
    /// opened. `N_USData_FF.indication`.
    fn first_frame(&mut self, address: &Address, declared_len: u16) {
        let _ = (address, declared_len);
    }
}

/// Callback form for callers that only want complete messages: the closure
/// runs on successful receptions and nothing else.
pub struct SimpleCallback<F>(pub F);

impl<F: FnMut(&[u8])> TransportCallback for SimpleCallback<F> {
    fn indication(&mut self, _address: &Address, data: &[u8], result: TpResult) {
        if result == TpResult::Ok {
            (self.0)(data);
        }
    }
}

/// Callback form that observes every reception outcome, including errors
/// and timeouts.
pub struct AdvancedCallback<F>(pub F);

impl<F: FnMut(&Address, &[u8], TpResult)> TransportCallback for AdvancedCallback<F> {
    fn indication(&mut self, address: &Address, data: &[u8], result: TpResult) {
        (self.0)(address, data, result)
    }
}
