//! Best-effort publishing: transmitter errors are logged and dropped.

use roode_traits::{Channel, Transmitter};

pub(crate) fn send<T: Transmitter + ?Sized>(tx: &mut T, channel: Channel, value: i32) {
    if let Err(e) = tx.transmit(channel, value) {
        tracing::warn!(%channel, value, error = %e, "publish failed");
    }
}

pub(crate) fn send_labeled<T: Transmitter + ?Sized>(
    tx: &mut T,
    channel: Channel,
    value: i32,
    label: &str,
) {
    if let Err(e) = tx.transmit_labeled(channel, value, label) {
        tracing::warn!(%channel, value, label, error = %e, "publish failed");
    }
}

pub(crate) fn present<T: Transmitter + ?Sized>(tx: &mut T) {
    if let Err(e) = tx.presentation() {
        tracing::warn!(error = %e, "presentation failed");
    }
}

/// Saturating conversion for counter values on the wire.
#[inline]
pub(crate) fn wire_value(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
