/// Network name reported by `net_version`.
pub const NETWORK_NAME: &str = "fabevm";

/// Serves the `net` namespace.
#[derive(Debug, Clone, Default)]
pub struct NetService;

impl NetService {
    /// Lowercase hex of the network name bytes.
    pub fn version(&self) -> String {
        hex::encode(NETWORK_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_hex_of_the_network_name() {
        assert_eq!(NetService.version(), "66616265766d");
    }
}
