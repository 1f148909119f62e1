//! Login handshake against a scripted server: the challenge answer,
//! the success and rejection paths, and outbound frame ordering.

use anyhow::Result;
use prost::Message as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use oef_agent::proto::{agent, server};
use oef_agent::{Core, OefAgent, OefError};

async fn read_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await.expect("frame header");
    let mut body = vec![0u8; u32::from_le_bytes(header) as usize];
    stream.read_exact(&mut body).await.expect("frame body");
    body
}

async fn write_frame(stream: &mut TcpStream, body: &[u8]) {
    stream
        .write_all(&(body.len() as u32).to_le_bytes())
        .await
        .expect("frame header");
    stream.write_all(body).await.expect("frame body");
}

fn phrase(challenge: &[u8]) -> Vec<u8> {
    server::Phrase {
        payload: Some(server::phrase::Payload::Phrase(challenge.to_vec())),
    }
    .encode_to_vec()
}

fn rejection() -> Vec<u8> {
    server::Phrase {
        payload: Some(server::phrase::Payload::Failure(server::Failure {
            cause: "unwelcome".to_string(),
        })),
    }
    .encode_to_vec()
}

fn connected(status: bool) -> Vec<u8> {
    server::Connected { status }.encode_to_vec()
}

/// Scenario: the server challenges with `abc`; the client must answer
/// with the byte-wise reversal and announce its heartbeat capability,
/// and the connect call resolves successfully.
#[tokio::test]
async fn login_round_trip() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let script = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();

        let id = agent::handshake::Id::decode(read_frame(&mut stream).await.as_slice()).unwrap();
        assert_eq!(id.public_key, "2A7gH9p");

        write_frame(&mut stream, &phrase(b"abc")).await;

        let answer =
            agent::handshake::Answer::decode(read_frame(&mut stream).await.as_slice()).unwrap();
        assert_eq!(answer.answer, b"cba");
        assert!(answer.capability_bits.expect("capability bits").will_heartbeat);

        write_frame(&mut stream, &connected(true)).await;
        stream
    });

    let core = Core::new();
    core.run_threaded()?;
    let mut client = OefAgent::new("2A7gH9p", "127.0.0.1", addr.port(), &core)?;
    client.connect().await?;
    assert!(client.is_connected());

    let _stream = script.await?;
    client.disconnect().await;
    core.stop();
    Ok(())
}

/// A pre-challenge rejection surfaces as `LoginRejected`; no session
/// is established.
#[tokio::test]
async fn login_rejected_before_challenge() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let script = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _id = read_frame(&mut stream).await;
        write_frame(&mut stream, &rejection()).await;
        // Hold the socket open; the client should still fail.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    });

    let core = Core::new();
    core.run_threaded()?;
    let mut client = OefAgent::new("2A7gH9p", "127.0.0.1", addr.port(), &core)?;
    match client.connect().await {
        Err(OefError::LoginRejected(cause)) => assert_eq!(cause, "unwelcome"),
        other => panic!("expected LoginRejected, got {:?}", other.err()),
    }
    assert!(!client.is_connected());

    script.await?;
    core.stop();
    Ok(())
}

/// `Connected{status=false}` after a correct answer also fails the
/// login.
#[tokio::test]
async fn login_rejected_by_status() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let script = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _id = read_frame(&mut stream).await;
        write_frame(&mut stream, &phrase(b"abc")).await;
        let _answer = read_frame(&mut stream).await;
        write_frame(&mut stream, &connected(false)).await;
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    });

    let core = Core::new();
    core.run_threaded()?;
    let mut client = OefAgent::new("2A7gH9p", "127.0.0.1", addr.port(), &core)?;
    assert!(matches!(
        client.connect().await,
        Err(OefError::LoginRejected(_))
    ));

    script.await?;
    core.stop();
    Ok(())
}

/// A dial to a port nobody listens on reaches the failure path, not a
/// hang.
#[tokio::test]
async fn dial_failure_surfaces_connection_error() -> Result<()> {
    // Bind-then-drop to get a port that is very likely closed.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        listener.local_addr()?.port()
    };

    let core = Core::new();
    core.run_threaded()?;
    let mut client = OefAgent::new("2A7gH9p", "127.0.0.1", port, &core)?;
    assert!(matches!(
        client.connect().await,
        Err(OefError::Connection(_))
    ));

    core.stop();
    Ok(())
}

/// Envelopes queued after login hit the wire in exactly the order they
/// were sent.
#[tokio::test]
async fn outbound_frames_keep_order() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    const COUNT: u32 = 40;

    let script = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _id = read_frame(&mut stream).await;
        write_frame(&mut stream, &phrase(b"p")).await;
        let _answer = read_frame(&mut stream).await;
        write_frame(&mut stream, &connected(true)).await;

        for expected in 1..=COUNT {
            let envelope =
                agent::Envelope::decode(read_frame(&mut stream).await.as_slice()).unwrap();
            assert_eq!(envelope.msg_id, expected, "frames arrived out of order");
        }
    });

    let core = Core::new();
    core.run_threaded()?;
    let mut client = OefAgent::new("2A7gH9p", "127.0.0.1", addr.port(), &core)?;
    client.connect().await?;

    for msg_id in 1..=COUNT {
        client.send_message(
            msg_id,
            1,
            "peer",
            format!("payload-{}", msg_id).into_bytes(),
            oef_agent::Context::default(),
        )?;
    }

    script.await?;
    client.disconnect().await;
    core.stop();
    Ok(())
}

/// Directory operations before `connect` are refused rather than
/// silently dropped.
#[tokio::test]
async fn requests_before_connect_are_refused() -> Result<()> {
    let core = Core::new();
    let client = OefAgent::new("2A7gH9p", "127.0.0.1", 3333, &core)?;
    assert!(matches!(
        client.unregister_agent(1),
        Err(OefError::Connection(_))
    ));
    Ok(())
}
