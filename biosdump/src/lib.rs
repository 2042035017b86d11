pub mod args;
pub mod dump;
pub mod source;

use std::io;

/// process exit status for a failed run
///
/// I/O failures pass their raw OS error code through, anything else is 1.
pub fn exit_status(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<io::Error>())
        .and_then(io::Error::raw_os_error)
        .filter(|&code| code != 0)
        .unwrap_or(1)
}
