use proptest::prelude::*;
use std::net::Ipv4Addr;

use dhcpool::{DhcpMessage, DhcpOptions, MessageType, OptionCode};

const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const DHCP_OPTIONS_OFFSET: usize = 240;
const DHCP_MIN_MESSAGE_SIZE: usize = 244;

fn valid_header() -> Vec<u8> {
    let mut message = vec![0u8; DHCP_OPTIONS_OFFSET];
    message[0] = 1;
    message[1] = 1;
    message[2] = 6;
    message[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    message
}

fn with_message_type(mut message: Vec<u8>) -> Vec<u8> {
    message.extend_from_slice(&[53, 1, 1]);
    message
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    #[test]
    fn decode_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
        let _ = DhcpMessage::decode(&data);
    }

    #[test]
    fn decode_never_panics_on_valid_header_with_random_options(
        options_data in prop::collection::vec(any::<u8>(), 4..512)
    ) {
        let mut message = valid_header();
        message.extend_from_slice(&options_data);
        let _ = DhcpMessage::decode(&message);
    }

    #[test]
    fn decode_never_panics_on_random_option_lengths(
        option_code in 1u8..254,
        option_length in any::<u8>(),
        option_data in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let mut message = with_message_type(valid_header());
        message.push(option_code);
        message.push(option_length);
        let actual_len = (option_length as usize).min(option_data.len());
        message.extend_from_slice(&option_data[..actual_len]);
        message.push(255);
        let _ = DhcpMessage::decode(&message);
    }

    #[test]
    fn relay_info_decode_never_panics(
        payload in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let mut message = with_message_type(valid_header());
        message.push(82);
        message.push(payload.len() as u8);
        message.extend_from_slice(&payload);
        message.push(255);

        if let Ok(decoded) = DhcpMessage::decode(&message) {
            let _ = decoded.options.relay_agent_info();
        }
    }

    #[test]
    fn roundtrip_encode_decode_preserves_fields(
        xid in any::<u32>(),
        secs in any::<u16>(),
        flags in any::<u16>(),
        ciaddr in any::<[u8; 4]>(),
        yiaddr in any::<[u8; 4]>(),
        siaddr in any::<[u8; 4]>(),
        giaddr in any::<[u8; 4]>(),
        chaddr in any::<[u8; 16]>(),
    ) {
        let mut message = valid_header();
        message[4..8].copy_from_slice(&xid.to_be_bytes());
        message[8..10].copy_from_slice(&secs.to_be_bytes());
        message[10..12].copy_from_slice(&flags.to_be_bytes());
        message[12..16].copy_from_slice(&ciaddr);
        message[16..20].copy_from_slice(&yiaddr);
        message[20..24].copy_from_slice(&siaddr);
        message[24..28].copy_from_slice(&giaddr);
        message[28..44].copy_from_slice(&chaddr);
        let mut message = with_message_type(message);
        message.push(255);

        let decoded = DhcpMessage::decode(&message).unwrap();
        let encoded = decoded.encode().unwrap();
        let redecoded = DhcpMessage::decode(&encoded).unwrap();

        prop_assert_eq!(decoded.op, redecoded.op);
        prop_assert_eq!(decoded.htype, redecoded.htype);
        prop_assert_eq!(decoded.hlen, redecoded.hlen);
        prop_assert_eq!(decoded.hops, redecoded.hops);
        prop_assert_eq!(decoded.xid, redecoded.xid);
        prop_assert_eq!(decoded.secs, redecoded.secs);
        prop_assert_eq!(decoded.flags, redecoded.flags);
        prop_assert_eq!(decoded.ciaddr, redecoded.ciaddr);
        prop_assert_eq!(decoded.yiaddr, redecoded.yiaddr);
        prop_assert_eq!(decoded.siaddr, redecoded.siaddr);
        prop_assert_eq!(decoded.giaddr, redecoded.giaddr);
        prop_assert_eq!(decoded.chaddr, redecoded.chaddr);
        prop_assert_eq!(&decoded.options, &redecoded.options);
    }

    #[test]
    fn option_values_survive_the_wire(
        lease in any::<u32>(),
        requested in any::<[u8; 4]>(),
    ) {
        let mut options = DhcpOptions::new();
        options.set_message_type(MessageType::Discover);
        options.set_lease_time(lease);
        options.set_addr(OptionCode::RequestedIpAddress, Ipv4Addr::from(requested));

        let mut buffer = Vec::new();
        options.encode_into(&mut buffer);
        let decoded = DhcpOptions::decode(&buffer).unwrap();

        prop_assert_eq!(decoded.message_type(), Some(MessageType::Discover));
        prop_assert_eq!(decoded.lease_time(), Some(lease));
        prop_assert_eq!(decoded.requested_ip(), Some(Ipv4Addr::from(requested)));
    }

    #[test]
    fn valid_messages_always_encode_to_at_least_300_bytes(
        xid in any::<u32>()
    ) {
        let mut message = valid_header();
        message[4..8].copy_from_slice(&xid.to_be_bytes());
        let mut message = with_message_type(message);
        message.push(255);

        let decoded = DhcpMessage::decode(&message).unwrap();
        let encoded = decoded.encode().unwrap();
        prop_assert!(encoded.len() >= 300);
    }

    #[test]
    fn short_messages_always_rejected(
        data in prop::collection::vec(any::<u8>(), 0..DHCP_MIN_MESSAGE_SIZE)
    ) {
        let result = DhcpMessage::decode(&data);
        prop_assert!(result.is_err());
    }

    #[test]
    fn bad_magic_cookie_always_rejected(
        cookie in any::<[u8; 4]>()
    ) {
        prop_assume!(cookie != DHCP_MAGIC_COOKIE);

        let mut message = with_message_type(valid_header());
        message[236..240].copy_from_slice(&cookie);
        message.push(255);

        let result = DhcpMessage::decode(&message);
        prop_assert!(result.is_err());
    }

    #[test]
    fn hardware_fields_never_rejected(
        htype in any::<u8>(),
        hlen in any::<u8>(),
        hops in any::<u8>(),
    ) {
        let mut message = with_message_type(valid_header());
        message[1] = htype;
        message[2] = hlen;
        message[3] = hops;
        message.push(255);

        let decoded = DhcpMessage::decode(&message).unwrap();
        prop_assert_eq!(decoded.htype, htype);
        prop_assert_eq!(decoded.hlen, hlen);
        prop_assert_eq!(decoded.hops, hops);
    }
}
