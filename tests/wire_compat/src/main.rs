fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::net::IpAddr;
    use std::path::PathBuf;

    use soundtrack_discovery::ServerResource;
    use soundtrack_protocol::wire::{ADVERTISEMENT_LEN, PROBE_LEN};
    use soundtrack_protocol::{DeviceAdvertisement, DeviceType, Message, MessageType, Probe};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Loads a hex fixture. Whitespace between digits is ignored.
    fn load_bytes(name: &str) -> Vec<u8> {
        let digits: String = read_fixture(name)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        hex::decode(&digits).unwrap_or_else(|e| panic!("invalid hex in {name}: {e}"))
    }

    fn load_json(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_json(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(fixture, reserialized, "roundtrip mismatch for {name}");
        parsed
    }

    // --- Binary records ---

    #[test]
    fn fixture_probe() {
        let bytes = load_bytes("probe.hex");
        assert_eq!(bytes.len(), PROBE_LEN);

        let probe = Probe::decode(&bytes);
        assert!(probe.is_well_formed());
        assert_eq!(probe.response_port, 2252);
        assert_eq!(Probe::new(2252).encode().as_slice(), bytes.as_slice());
    }

    #[test]
    fn fixture_server_advertisement() {
        let bytes = load_bytes("server_advertisement.hex");
        assert_eq!(bytes.len(), ADVERTISEMENT_LEN);

        let adv = DeviceAdvertisement::decode(&bytes);
        assert!(adv.is_well_formed());
        assert_eq!(adv.device_type, DeviceType::Server);
        assert_eq!(adv.id, "Ab3dE6gH9k");
        assert_eq!(adv.stream_port, 2251);
        assert_eq!(adv.comm_port, 2252);
        assert_eq!(adv.rest_port, 2249);
        assert_eq!(adv.device_name, "Living Room");
        assert_eq!(adv.encode().as_slice(), bytes.as_slice());
    }

    #[test]
    fn fixture_server_advertisement_as_resource() {
        let adv = DeviceAdvertisement::decode(&load_bytes("server_advertisement.hex"));
        let ip: IpAddr = "192.168.1.20".parse().unwrap();
        let server = ServerResource::from_advertisement(&adv, ip).unwrap();
        assert_eq!(server.to_string(), "Living Room - 192.168.1.20:2252 (Ab3dE6gH9k)");
        let expected = load_bytes("server_advertisement.hex");
        assert_eq!(server.to_advertisement().encode().as_slice(), expected.as_slice());
    }

    #[test]
    fn fixture_smart_output_without_id() {
        let bytes = load_bytes("smart_output_no_id.hex");
        let adv = DeviceAdvertisement::decode(&bytes);
        assert!(adv.is_well_formed());
        assert_eq!(adv.device_type, DeviceType::SmartOutput);
        assert_eq!(adv.id, "");
        assert_eq!(adv.rest_port, -1);
        assert_eq!(adv.device_name, "Kitchen");
        assert_eq!(adv.encode().as_slice(), bytes.as_slice());

        let ip: IpAddr = "192.168.1.21".parse().unwrap();
        assert!(ServerResource::from_advertisement(&adv, ip).is_err());
    }

    // --- Message envelopes ---

    #[test]
    fn fixture_message_envelope() {
        let msg: Message = roundtrip_test("message_envelope.json");
        assert_eq!(msg.msg_type, MessageType::GiveId);
        assert_eq!(msg.message.as_deref(), Some("Ab3dE6gH9k"));
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn fixture_message_ping() {
        let msg: Message = roundtrip_test("message_ping.json");
        assert_eq!(msg.msg_type, MessageType::Ping);
        assert!(msg.message.is_none());

        let json = read_fixture("message_ping.json");
        assert_eq!(Message::from_json(&json).unwrap(), msg);
    }
}
