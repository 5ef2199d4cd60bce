//! End-to-end exchanges against a running server over loopback UDP.
//!
//! The client plays the part of a relay agent: `giaddr` is set on every
//! request, so replies come back to the client's own socket instead of
//! the broadcast address.

use std::net::{Ipv4Addr, SocketAddr};

use macaddr::MacAddr6;
use tokio::net::UdpSocket;
use tokio::time::{Duration, timeout};

use dhcpool::message::{BOOTREPLY, BOOTREQUEST, HLEN_ETHERNET, HTYPE_ETHERNET};
use dhcpool::options::{SUB_OPTION_CIRCUIT_ID, SUB_OPTION_REMOTE_ID};
use dhcpool::{
    Allocator, Config, DhcpMessage, DhcpOptions, DhcpServer, MessageType, OptionCode, SubnetPool,
};

const SERVER_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 3);
const RELAY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 77);
const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 1);

fn test_pool() -> SubnetPool {
    SubnetPool::new(
        1,
        Ipv4Addr::new(192, 168, 0, 0),
        Ipv4Addr::new(255, 255, 255, 0),
        Ipv4Addr::new(192, 168, 0, 190),
        Ipv4Addr::new(192, 168, 0, 199),
        GATEWAY_IP,
    )
}

async fn start_server(allocator: Allocator) -> (DhcpServer<Allocator>, SocketAddr) {
    let server = DhcpServer::new(SERVER_IP, allocator).with_port(0);
    server.start().await.unwrap();

    let port = server.local_addr().await.unwrap().port();
    (server, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
}

fn client_message(message_type: MessageType, chaddr: MacAddr6, xid: u32) -> DhcpMessage {
    let mut options = DhcpOptions::new();
    options.set_message_type(message_type);

    DhcpMessage {
        op: BOOTREQUEST,
        htype: HTYPE_ETHERNET,
        hlen: HLEN_ETHERNET,
        hops: 1,
        xid,
        secs: 0,
        flags: 0,
        ciaddr: Ipv4Addr::UNSPECIFIED,
        yiaddr: Ipv4Addr::UNSPECIFIED,
        siaddr: Ipv4Addr::UNSPECIFIED,
        giaddr: RELAY_IP,
        chaddr,
        sname: String::new(),
        file: String::new(),
        options,
    }
}

async fn exchange(
    client: &UdpSocket,
    destination: SocketAddr,
    message: &DhcpMessage,
) -> DhcpMessage {
    client
        .send_to(&message.encode().unwrap(), destination)
        .await
        .unwrap();

    let mut buffer = [0u8; 1500];
    let (size, _) = timeout(Duration::from_secs(5), client.recv_from(&mut buffer))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();

    DhcpMessage::decode(&buffer[..size]).unwrap()
}

#[tokio::test]
async fn test_discover_offer_request_ack() {
    let (server, destination) = start_server(Allocator::new(SERVER_IP, vec![test_pool()])).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let chaddr = MacAddr6::new(0x12, 0x34, 0x56, 0x78, 0x90, 0x12);
    let discover = client_message(MessageType::Discover, chaddr, 0x3903F326);

    let offer = exchange(&client, destination, &discover).await;

    assert_eq!(offer.op, BOOTREPLY);
    assert_eq!(offer.options.message_type(), Some(MessageType::Offer));
    assert_eq!(offer.xid, discover.xid);
    assert_eq!(offer.chaddr, chaddr);
    assert_eq!(offer.giaddr, RELAY_IP);

    let offered = offer.yiaddr;
    assert!(u32::from(offered) >= u32::from(Ipv4Addr::new(192, 168, 0, 190)));
    assert!(u32::from(offered) <= u32::from(Ipv4Addr::new(192, 168, 0, 199)));
    assert_eq!(offer.options.lease_time(), Some(60));
    assert_eq!(
        offer.options.get_addr(OptionCode::SubnetMask),
        Some(Ipv4Addr::new(255, 255, 255, 0))
    );
    assert_eq!(offer.options.get_addr(OptionCode::Router), Some(GATEWAY_IP));
    assert_eq!(offer.options.server_identifier(), Some(SERVER_IP));

    let mut request = client_message(MessageType::Request, chaddr, discover.xid);
    request
        .options
        .set_addr(OptionCode::ServerIdentifier, SERVER_IP);
    request
        .options
        .set_addr(OptionCode::RequestedIpAddress, offered);

    let ack = exchange(&client, destination, &request).await;

    assert_eq!(ack.options.message_type(), Some(MessageType::Ack));
    assert_eq!(ack.yiaddr, offered);
    assert_eq!(ack.chaddr, chaddr);
    assert_eq!(ack.options.lease_time(), Some(60));
    assert_eq!(ack.options.server_identifier(), Some(SERVER_IP));

    server.stop().await;
}

#[tokio::test]
async fn test_repeat_discover_offers_the_same_address() {
    let (server, destination) = start_server(Allocator::new(SERVER_IP, vec![test_pool()])).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let chaddr = MacAddr6::new(0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22);
    let discover = client_message(MessageType::Discover, chaddr, 0x11111111);

    let first = exchange(&client, destination, &discover).await;
    let second = exchange(&client, destination, &discover).await;

    assert_eq!(first.yiaddr, second.yiaddr);

    server.stop().await;
}

#[tokio::test]
async fn test_request_for_other_server_gets_no_reply() {
    let (server, destination) = start_server(Allocator::new(SERVER_IP, vec![test_pool()])).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let chaddr = MacAddr6::new(0xAA, 0xBB, 0xCC, 0x33, 0x44, 0x55);
    let discover = client_message(MessageType::Discover, chaddr, 0x22222222);
    let offer = exchange(&client, destination, &discover).await;
    assert_eq!(offer.options.message_type(), Some(MessageType::Offer));

    // The client picked a different server; ours must stay silent even
    // though it holds a lease for this client.
    let mut request = client_message(MessageType::Request, chaddr, 0x22222222);
    request
        .options
        .set_addr(OptionCode::ServerIdentifier, Ipv4Addr::new(192, 168, 0, 9));

    client
        .send_to(&request.encode().unwrap(), destination)
        .await
        .unwrap();

    let mut buffer = [0u8; 1500];
    let result = timeout(Duration::from_millis(500), client.recv_from(&mut buffer)).await;
    assert!(result.is_err());

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_request_gets_nak_when_configured() {
    let allocator =
        Allocator::new(SERVER_IP, vec![test_pool()]).with_nak_unknown_requests(true);
    let (server, destination) = start_server(allocator).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let chaddr = MacAddr6::new(0xAA, 0xBB, 0xCC, 0x66, 0x77, 0x88);
    let mut request = client_message(MessageType::Request, chaddr, 0x33333333);
    request
        .options
        .set_addr(OptionCode::ServerIdentifier, SERVER_IP);

    let nak = exchange(&client, destination, &request).await;

    assert_eq!(nak.options.message_type(), Some(MessageType::Nak));
    assert!(nak.options.message_text().is_some());
    assert!(!nak.options.contains(OptionCode::SubnetMask));
    assert!(!nak.options.contains(OptionCode::Router));
    assert_eq!(nak.options.server_identifier(), Some(SERVER_IP));

    server.stop().await;
}

#[tokio::test]
async fn test_relay_info_selects_pool_over_giaddr() {
    let (server, destination) =
        start_server(Allocator::from_config(&Config::default())).await;
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

    let chaddr = MacAddr6::new(0xAA, 0xBB, 0xCC, 0x99, 0xAA, 0xBB);
    let mut discover = client_message(MessageType::Discover, chaddr, 0x44444444);
    // giaddr on neither subnet; only the remote-id mapping can place
    // this client, and it points at the 192.168.2.x pool.
    discover.giaddr = Ipv4Addr::new(10, 9, 9, 9);

    let remote_id = "d4-f5-27-63-b8-b3";
    let mut payload = vec![SUB_OPTION_CIRCUIT_ID, 5];
    payload.extend_from_slice(b"Vlan1");
    payload.push(SUB_OPTION_REMOTE_ID);
    payload.push(remote_id.len() as u8);
    payload.extend_from_slice(remote_id.as_bytes());
    discover.options.set(OptionCode::RelayAgentInfo, payload);

    let offer = exchange(&client, destination, &discover).await;

    let offered = offer.yiaddr;
    assert!(u32::from(offered) >= u32::from(Ipv4Addr::new(192, 168, 2, 150)));
    assert!(u32::from(offered) <= u32::from(Ipv4Addr::new(192, 168, 2, 160)));
    assert_eq!(
        offer.options.get_addr(OptionCode::Router),
        Some(Ipv4Addr::new(192, 168, 2, 1))
    );

    server.stop().await;
}
