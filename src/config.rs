/// Runtime settings for a [`RelayServer`](crate::RelayServer).
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on, `host:port`.
    pub addr: String,
    /// Send a close frame with the connection's status before hanging up.
    pub close_frame: bool,
    /// Payload that asks the relay to disconnect its sender.
    pub sentinel: String,
    /// Queue depth of the registry task.
    pub backlog: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: "localhost:8080".into(),
            close_frame: false,
            sentinel: "EXIT".into(),
            backlog: 256,
        }
    }
}
