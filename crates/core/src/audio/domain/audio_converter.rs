use std::path::Path;

/// Exit code reported by a successful conversion.
pub const CONVERSION_OK: i32 = 0;

/// Domain interface for the format-conversion stage.
///
/// Converts `input` into 16 kHz mono PCM at `output`. The result is an exit
/// code: `0` is success, anything else is an opaque failure.
pub trait AudioConverter: Send + Sync {
    fn convert(&self, input: &Path, output: &Path) -> i32;
}
