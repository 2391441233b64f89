//! Captures device errors raised by a group of wgpu calls.

/// Validation and out-of-memory scopes pushed together.
///
/// Both filters must be captured: an allocation the device refuses is
/// reported as out-of-memory, and an uncaptured error panics.
#[must_use = "an error scope must be finished to pop it"]
pub(crate) struct ErrorScope<'d> {
    device: &'d wgpu::Device,
}

impl<'d> ErrorScope<'d> {
    pub(crate) fn push(device: &'d wgpu::Device) -> Self {
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        Self { device }
    }

    /// Pops both scopes, innermost first, and returns the first error seen.
    pub(crate) fn finish(self) -> Option<wgpu::Error> {
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        validation.or(out_of_memory)
    }
}
