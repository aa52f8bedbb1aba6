//! Output sinks for converted files.

use crate::pipeline::ConversionOutput;
use crate::Result;

/// Destination for finished conversions.
///
/// A sink receives each file's histograms by move, exactly once.
pub trait HistogramSink {
    /// Persists one converted file.
    ///
    /// # Errors
    /// Returns an error if the output cannot be written.
    fn write(&mut self, output: ConversionOutput) -> Result<()>;
}

/// Sink keeping every conversion in memory.
#[derive(Default)]
pub struct MemorySink {
    pub outputs: Vec<ConversionOutput>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistogramSink for MemorySink {
    fn write(&mut self, output: ConversionOutput) -> Result<()> {
        self.outputs.push(output);
        Ok(())
    }
}

impl<S: HistogramSink + ?Sized> HistogramSink for &mut S {
    fn write(&mut self, output: ConversionOutput) -> Result<()> {
        (**self).write(output)
    }
}
