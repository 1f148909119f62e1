//! The steady-state agent loop against a scripted server: heartbeats,
//! search results, dialogue deliveries and their context scoping, and
//! error frames.

use anyhow::Result;
use async_trait::async_trait;
use prost::Message as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use oef_agent::connection::handlers::MultipleConnectionMessageHandler;
use oef_agent::connection::{ConnectOptions, Connection, SharedHandler};
use oef_agent::messages;
use oef_agent::proto::{agent, fipa, server};
use oef_agent::proxy::ContextLookup;
use oef_agent::{
    AgentHandler, CfpPayload, Context, Core, OefAgent, OefErrorOperation, Proposals,
    SearchResultItem, StopHandle,
};

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

/// Accept one client and drive it through the login handshake.
async fn accept_and_login(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.expect("accept");
    let _id = read_frame(&mut stream).await;
    write_frame(
        &mut stream,
        &server::Phrase {
            payload: Some(server::phrase::Payload::Phrase(b"xyz".to_vec())),
        }
        .encode_to_vec(),
    )
    .await;
    let _answer = read_frame(&mut stream).await;
    write_frame(&mut stream, &server::Connected { status: true }.encode_to_vec()).await;
    stream
}

fn agent_message(answer_id: u32, payload: server::agent_message::Payload) -> Vec<u8> {
    server::AgentMessage {
        answer_id,
        source_uri: String::new(),
        target_uri: String::new(),
        payload: Some(payload),
    }
    .encode_to_vec()
}

#[derive(Default)]
struct Recorder {
    stop: Option<StopHandle>,
    contexts: Option<ContextLookup>,
    messages: Vec<(u32, u32, String, Vec<u8>)>,
    seen_context: Vec<Context>,
    cfps: Vec<(u32, u32, String, u32, CfpPayload)>,
    proposals: Vec<(u32, Proposals)>,
    accepts: Vec<(u32, u32)>,
    declines: Vec<(u32, u32)>,
    oef_errors: Vec<(u32, OefErrorOperation)>,
    dialogue_errors: Vec<(u32, u32, String)>,
    search_results: Vec<(u32, Vec<String>)>,
    wide_results: Vec<(u32, Vec<SearchResultItem>)>,
}

impl Recorder {
    fn stop_if_asked(&self) {
        if let Some(stop) = &self.stop {
            stop.stop();
        }
    }
}

#[async_trait]
impl AgentHandler for Recorder {
    async fn on_message(&mut self, msg_id: u32, dialogue_id: u32, origin: &str, content: Vec<u8>) {
        if let Some(contexts) = &self.contexts {
            self.seen_context
                .push(contexts.get(msg_id, dialogue_id, origin));
        }
        self.messages
            .push((msg_id, dialogue_id, origin.to_string(), content));
    }

    async fn on_cfp(
        &mut self,
        msg_id: u32,
        dialogue_id: u32,
        origin: &str,
        target: u32,
        payload: CfpPayload,
    ) {
        self.cfps
            .push((msg_id, dialogue_id, origin.to_string(), target, payload));
    }

    async fn on_propose(
        &mut self,
        msg_id: u32,
        _dialogue_id: u32,
        _origin: &str,
        target: u32,
        proposals: Proposals,
    ) {
        let _ = msg_id;
        self.proposals.push((target, proposals));
    }

    async fn on_accept(&mut self, msg_id: u32, _dialogue_id: u32, _origin: &str, target: u32) {
        self.accepts.push((msg_id, target));
    }

    async fn on_decline(&mut self, msg_id: u32, _dialogue_id: u32, _origin: &str, target: u32) {
        self.declines.push((msg_id, target));
    }

    async fn on_oef_error(&mut self, answer_id: u32, operation: OefErrorOperation) {
        self.oef_errors.push((answer_id, operation));
    }

    async fn on_dialogue_error(&mut self, answer_id: u32, dialogue_id: u32, origin: &str) {
        self.dialogue_errors
            .push((answer_id, dialogue_id, origin.to_string()));
    }

    async fn on_search_result(&mut self, search_id: u32, agents: Vec<String>) {
        self.search_results.push((search_id, agents));
        self.stop_if_asked();
    }

    async fn on_search_result_wide(&mut self, search_id: u32, items: Vec<SearchResultItem>) {
        self.wide_results.push((search_id, items));
        self.stop_if_asked();
    }
}

async fn connected_agent(listener: &TcpListener, core: &Core) -> (OefAgent, TcpStream) {
    let port = listener.local_addr().expect("addr").port();
    let mut client = OefAgent::new("2A7gH9p", "127.0.0.1", port, core).expect("agent");
    let (stream, connected) = tokio::join!(accept_and_login(listener), client.connect());
    connected.expect("connect");
    (client, stream)
}

/// Scenario: a server ping is answered with `Envelope{msg_id: 0,
/// pong.dummy: 77}` by the connection itself; the user's callbacks
/// never see it.
#[tokio::test]
async fn ping_is_answered_without_user_dispatch() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let core = Core::new();
    core.run_threaded()?;
    let (mut client, mut stream) = connected_agent(&listener, &core).await;

    let mut recorder = Recorder {
        stop: Some(client.stop_handle()),
        ..Default::default()
    };

    let server = tokio::spawn(async move {
        write_frame(
            &mut stream,
            &agent_message(
                9,
                server::agent_message::Payload::Ping(server::Ping { dummy: 0 }),
            ),
        )
        .await;

        let pong = agent::Envelope::decode(read_frame(&mut stream).await.as_slice()).unwrap();
        assert_eq!(pong.msg_id, 0);
        match pong.payload {
            Some(agent::envelope::Payload::Pong(pong)) => assert_eq!(pong.dummy, 77),
            other => panic!("expected a pong, got case {:?}", other.is_some()),
        }

        // A search result lets the loop observe something and stop.
        write_frame(
            &mut stream,
            &agent_message(
                3,
                server::agent_message::Payload::Agents(server::Agents {
                    agents: vec!["peer".to_string()],
                }),
            ),
        )
        .await;
        stream
    });

    client.run(&mut recorder).await?;
    let _stream = server.await?;

    assert!(recorder.messages.is_empty(), "ping must not reach on_message");
    assert_eq!(recorder.search_results, vec![(3, vec!["peer".to_string()])]);

    client.disconnect().await;
    core.stop();
    Ok(())
}

/// Scenario: a wide search result flattens into one item per agent,
/// in order, each carrying its core's coordinates.
#[tokio::test]
async fn wide_search_results_flatten_in_order() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let core = Core::new();
    core.run_threaded()?;
    let (mut client, mut stream) = connected_agent(&listener, &core).await;

    let mut recorder = Recorder {
        stop: Some(client.stop_handle()),
        ..Default::default()
    };

    let server = tokio::spawn(async move {
        let wide = server::AgentsWide {
            result: vec![
                server::agents_wide::Item {
                    key: b"X".to_vec(),
                    ip: "1.2.3.4".to_string(),
                    port: 80,
                    distance: 7,
                    agents: vec![
                        server::agents_wide::AgentInfo { key: b"a".to_vec() },
                        server::agents_wide::AgentInfo { key: b"b".to_vec() },
                    ],
                },
                server::agents_wide::Item {
                    key: b"Y".to_vec(),
                    ip: "5.6.7.8".to_string(),
                    port: 81,
                    distance: 9,
                    agents: vec![server::agents_wide::AgentInfo { key: b"c".to_vec() }],
                },
            ],
        };
        write_frame(
            &mut stream,
            &agent_message(12, server::agent_message::Payload::AgentsWide(wide)),
        )
        .await;
        stream
    });

    client.run(&mut recorder).await?;
    let _stream = server.await?;

    let (search_id, items) = recorder.wide_results.pop().expect("wide result");
    assert_eq!(search_id, 12);
    assert_eq!(
        items,
        vec![
            SearchResultItem {
                agent_key: "a".to_string(),
                core_key: "X".to_string(),
                core_addr: "1.2.3.4".to_string(),
                core_port: 80,
                distance: 7,
            },
            SearchResultItem {
                agent_key: "b".to_string(),
                core_key: "X".to_string(),
                core_addr: "1.2.3.4".to_string(),
                core_port: 80,
                distance: 7,
            },
            SearchResultItem {
                agent_key: "c".to_string(),
                core_key: "Y".to_string(),
                core_addr: "5.6.7.8".to_string(),
                core_port: 81,
                distance: 9,
            },
        ]
    );

    client.disconnect().await;
    core.stop();
    Ok(())
}

/// Property: the dialogue context exists exactly for the duration of
/// its callback.
#[tokio::test]
async fn dialogue_context_is_scoped_to_the_callback() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let core = Core::new();
    core.run_threaded()?;
    let (mut client, mut stream) = connected_agent(&listener, &core).await;

    let mut recorder = Recorder {
        stop: Some(client.stop_handle()),
        contexts: Some(client.context_lookup()),
        ..Default::default()
    };

    let server = tokio::spawn(async move {
        let content = server::AgentMessage {
            answer_id: 21,
            source_uri: "tcp://1.2.3.4:3333/ck/ns/sender-key/sender-alias".to_string(),
            target_uri: "tcp://1.2.3.4:3333/ck/ns/2A7gH9p/books".to_string(),
            payload: Some(server::agent_message::Payload::Content(server::Content {
                dialogue_id: 5,
                origin: "sender-key".to_string(),
                payload: Some(server::content::Payload::Content(b"hello".to_vec())),
            })),
        };
        write_frame(&mut stream, &content.encode_to_vec()).await;

        write_frame(
            &mut stream,
            &agent_message(
                1,
                server::agent_message::Payload::Agents(server::Agents { agents: vec![] }),
            ),
        )
        .await;
        stream
    });

    client.run(&mut recorder).await?;
    let _stream = server.await?;

    assert_eq!(
        recorder.messages,
        vec![(21, 5, "sender-key".to_string(), b"hello".to_vec())]
    );
    // During the callback the context matched the frame's URIs.
    let seen = recorder.seen_context.pop().expect("context during callback");
    assert_eq!(seen.service_id, "books");
    assert_eq!(seen.source_uri.agent_key, "sender-key");
    assert_eq!(seen.target_uri.agent_key, "2A7gH9p");
    // Afterwards the same lookup yields a fresh empty context.
    assert_eq!(client.get_context(21, 5, "sender-key"), Context::default());

    client.disconnect().await;
    core.stop();
    Ok(())
}

/// FIPA deliveries dispatch to their own callbacks, with payloads
/// decoded.
#[tokio::test]
async fn fipa_messages_dispatch_to_their_callbacks() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let core = Core::new();
    core.run_threaded()?;
    let (mut client, mut stream) = connected_agent(&listener, &core).await;

    let mut recorder = Recorder {
        stop: Some(client.stop_handle()),
        ..Default::default()
    };

    let server = tokio::spawn(async move {
        let fipa_content = |dialogue_id: u32, msg: fipa::message::Msg| {
            server::agent_message::Payload::Content(server::Content {
                dialogue_id,
                origin: "seller".to_string(),
                payload: Some(server::content::Payload::Fipa(fipa::Message {
                    target: 4,
                    msg: Some(msg),
                })),
            })
        };

        write_frame(
            &mut stream,
            &agent_message(
                30,
                fipa_content(
                    6,
                    fipa::message::Msg::Cfp(fipa::Cfp {
                        payload: Some(fipa::cfp::Payload::Content(b"terms".to_vec())),
                    }),
                ),
            ),
        )
        .await;
        write_frame(
            &mut stream,
            &agent_message(
                31,
                fipa_content(
                    6,
                    fipa::message::Msg::Propose(fipa::Propose {
                        payload: Some(fipa::propose::Payload::Content(b"offer".to_vec())),
                    }),
                ),
            ),
        )
        .await;
        write_frame(
            &mut stream,
            &agent_message(32, fipa_content(6, fipa::message::Msg::Accept(fipa::Accept {}))),
        )
        .await;
        write_frame(
            &mut stream,
            &agent_message(33, fipa_content(6, fipa::message::Msg::Decline(fipa::Decline {}))),
        )
        .await;
        write_frame(
            &mut stream,
            &agent_message(
                1,
                server::agent_message::Payload::Agents(server::Agents { agents: vec![] }),
            ),
        )
        .await;
        stream
    });

    client.run(&mut recorder).await?;
    let _stream = server.await?;

    assert_eq!(recorder.cfps.len(), 1);
    let (msg_id, dialogue_id, origin, target, payload) = recorder.cfps.pop().expect("cfp");
    assert_eq!(
        (msg_id, dialogue_id, origin.as_str(), target),
        (30, 6, "seller", 4)
    );
    assert_eq!(payload, CfpPayload::Raw(b"terms".to_vec()));
    assert_eq!(recorder.proposals, vec![(4, Proposals::Raw(b"offer".to_vec()))]);
    assert_eq!(recorder.accepts, vec![(32, 4)]);
    assert_eq!(recorder.declines, vec![(33, 4)]);

    client.disconnect().await;
    core.stop();
    Ok(())
}

/// Error frames surface their operation code; an unknown payload case
/// becomes BAD_MESSAGE and the loop keeps running.
#[tokio::test]
async fn error_frames_and_bad_messages_keep_the_loop_alive() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let core = Core::new();
    core.run_threaded()?;
    let (mut client, mut stream) = connected_agent(&listener, &core).await;

    let mut recorder = Recorder {
        stop: Some(client.stop_handle()),
        ..Default::default()
    };

    let server = tokio::spawn(async move {
        let mut oef_error =
            messages::OefErrorMessage::new(40, OefErrorOperation::SendMessage);
        oef_error.cause = "routing".to_string();
        oef_error.detail = "peer unknown".to_string();
        write_frame(&mut stream, &oef_error.to_agent_message().encode_to_vec()).await;

        let dialogue_error = messages::DialogueErrorMessage::new(41, 2, "peer");
        write_frame(&mut stream, &dialogue_error.to_agent_message().encode_to_vec()).await;

        // A frame with no payload case at all.
        let empty = server::AgentMessage {
            answer_id: 42,
            source_uri: String::new(),
            target_uri: String::new(),
            payload: None,
        };
        write_frame(&mut stream, &empty.encode_to_vec()).await;

        let done = messages::SearchResultMessage::new(1, vec![]);
        write_frame(&mut stream, &done.to_agent_message().encode_to_vec()).await;
        stream
    });

    client.run(&mut recorder).await?;
    let _stream = server.await?;

    assert_eq!(
        recorder.oef_errors,
        vec![
            (40, OefErrorOperation::SendMessage),
            (42, OefErrorOperation::BadMessage),
        ]
    );
    assert_eq!(
        recorder.dialogue_errors,
        vec![(41, 2, "peer".to_string())]
    );
    // The error detail was scoped to its callback.
    assert_eq!(client.error_detail(40), Default::default());
    // The loop survived the bad frame and delivered the final result.
    assert_eq!(recorder.search_results.len(), 1);

    client.disconnect().await;
    core.stop();
    Ok(())
}

/// One steady-state handler can serve several connections, tracking
/// the live set and the url map.
#[tokio::test]
async fn shared_handler_tracks_multiple_connections() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("127.0.0.1:{}", listener.local_addr()?.port());
    let core = Core::new();
    core.run_threaded()?;

    let (frame_tx, mut frame_rx) = tokio::sync::mpsc::unbounded_channel();
    let shared = std::sync::Arc::new(tokio::sync::Mutex::new(
        MultipleConnectionMessageHandler::new(Some(frame_tx)),
    ));

    let server = tokio::spawn(async move {
        let mut streams = Vec::new();
        for _ in 0..2 {
            let mut stream = accept_and_login(&listener).await;
            let done = messages::SearchResultMessage::new(1, vec![]);
            write_frame(&mut stream, &done.to_agent_message().encode_to_vec()).await;
            streams.push(stream);
        }
        streams
    });

    for i in 0..2 {
        let connection = Connection::new(&core, Some(format!("multi-{}", i)));
        let install: SharedHandler = shared.clone();
        let options = ConnectOptions::new(&url, "2A7gH9p").on_success(Box::new(
            move |conn, _url, _name| {
                conn.set_shared_message_handler(install);
            },
        ));
        connection.connect(options)?;
    }

    // Both connections must deliver their unhandled frame through the
    // shared handler.
    for _ in 0..2 {
        tokio::time::timeout(std::time::Duration::from_secs(5), frame_rx.recv())
            .await
            .expect("frame within deadline")
            .expect("frame");
    }

    let _streams = server.await?;
    {
        let guard = shared.lock().await;
        assert_eq!(guard.connections().len(), 2);
        assert!(guard.send_to(&url, b"broadcast".to_vec()).is_ok());
        assert!(guard.send_to("10.0.0.1:1", Vec::new()).is_err());
    }

    core.stop();
    Ok(())
}
