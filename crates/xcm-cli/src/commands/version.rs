//! `xcm version`

use crate::Result;

/// Version of this client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() -> Result<()> {
    println!("{}", VERSION);
    Ok(())
}
