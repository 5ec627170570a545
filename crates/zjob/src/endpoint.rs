/// The three addresses a pool binds.
///
/// The public endpoint comes from configuration; the two in-process endpoints
/// are derived from the pool index so that several pools can share one
/// process without colliding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// Public ROUTER address, `tcp://{address}:{port}` (`*` for port `0`).
    pub frontend: String,
    /// Internal DEALER address that workers connect to.
    pub backend: String,
    /// Control broadcast address that workers and the orchestrator subscribe
    /// to.
    pub control: String,
}

impl Endpoints {
    pub fn new(index: u64, address: &str, port: u16) -> Self {
        let frontend = match port {
            0 => format!("tcp://{address}:*"),
            port => format!("tcp://{address}:{port}"),
        };
        Self {
            frontend,
            backend: format!("inproc://zjob-{index}-dealer"),
            control: format!("inproc://zjob-{index}-control"),
        }
    }
}
