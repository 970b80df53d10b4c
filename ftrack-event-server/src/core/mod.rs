/*!
Core modules of the event server: configuration, startup checks and the
supervisor keeping the event workers alive
*/

pub mod bootstrap;
pub mod config;
pub mod credentials;
pub mod probes;
pub mod session;
pub mod supervisor;
pub mod workers;

#[cfg(test)]
mod test_support;
