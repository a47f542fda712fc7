//! Lifecycle contract expected by the upper NMEA 2000 stack from a CAN
//! data-link adapter: buffer setup, a single idempotent open, then
//! independent send and receive calls.
use crate::protocol::transport::can_frame::CanFrame;

/// Frame-level contract between the protocol stack and a controller adapter.
///
/// Every call reports through a plain boolean/`Option`: failures stay local to
/// the adapter and are only visible through logs.
pub trait FrameLink {
    /// Configure RX/TX queue depths. Only honoured before [`open`](Self::open).
    fn set_buffer_size(&self, rx: u16, tx: u16);

    /// Called once by the stack before `open`; applies default queue depths.
    fn init_frame_buffers(&self);

    /// Bring the controller up. Calling it again once open is a no-op.
    fn open(&self) -> bool;

    /// Queue one extended frame. `len` is clamped to 8. With `wait_sent`, waits
    /// a bounded time for queue space, otherwise returns immediately.
    fn send_frame<'a>(
        &'a self,
        id: u32,
        len: u8,
        payload: &'a [u8],
        wait_sent: bool,
    ) -> impl core::future::Future<Output = bool> + 'a;

    /// Pop the next received frame without waiting. `None` when nothing is queued.
    fn receive_frame(&self) -> Option<CanFrame>;
}
