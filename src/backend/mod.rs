//! Backend invocation: which program runs a session and with which flags.

mod profile;

pub use profile::{find_mpv, BackendProfile, CommandLauncher, PASSTHROUGH_CODECS};
