//! Window constants.

/// Default number of unacknowledged frames (stop-and-wait).
pub const DEFAULT_SEND_WINDOW: u8 = 1;

/// Default number of frames buffered out of order.
pub const DEFAULT_RECV_WINDOW: u8 = 1;

/// Largest supported window.
///
/// Slots are indexed by `seq % window`, so the window must divide the 8-bit
/// sequence space, and it must stay below half of it for serial comparison.
pub const MAX_WINDOW: u8 = 64;

/// Value of `last_frame` and `last_ack` after a reset, so the first frame is 0.
pub const INITIAL_LAST_FRAME: u8 = 0xFF;

/// Check a window size against [`MAX_WINDOW`] and the power-of-two rule.
pub fn is_valid_window(size: u8) -> bool {
    size.is_power_of_two() && size <= MAX_WINDOW
}
