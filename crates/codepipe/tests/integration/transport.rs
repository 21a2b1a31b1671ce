use std::net::SocketAddr;

use codepipe::{ClientMessage, RunRequest, Server, SessionEvent, SessionManager};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{TIMEOUT, shell_manager, workspace_files};

struct TestServer {
    addr: SocketAddr,
    manager: SessionManager,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

async fn start_server(workspace: &std::path::Path) -> TestServer {
    let manager = shell_manager(workspace).await;
    let server = Server::bind_to("127.0.0.1:0", manager.clone())
        .await
        .expect("Failed to bind");
    let addr = server.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async {
        let _ = stopped.await;
    }));
    TestServer {
        addr,
        manager,
        stop,
        task,
    }
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn send(&mut self, message: ClientMessage) {
        let line = message.encode().unwrap();
        self.send_raw(&line).await;
    }

    async fn execute(&mut self, language: &str, code: &str) {
        self.send(ClientMessage::Execute(RunRequest {
            code: code.to_owned(),
            language: language.to_owned(),
        }))
        .await;
    }

    async fn next_event(&mut self) -> SessionEvent {
        let line = tokio::time::timeout(TIMEOUT, self.lines.next_line())
            .await
            .expect("no event in time")
            .unwrap()
            .expect("server closed the connection");
        SessionEvent::decode(&line).expect("server sent malformed event")
    }

    /// Concatenate output events until `needle` shows up
    async fn output_until(&mut self, needle: &str) -> String {
        let mut out = String::new();
        while !out.contains(needle) {
            match self.next_event().await {
                SessionEvent::Output(text) => out.push_str(&text),
                other => panic!("unexpected event {other:?} while waiting for {needle:?}"),
            }
        }
        out
    }
}

#[tokio::test]
async fn test_connect_assigns_connection_id() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path()).await;

    let mut first = Client::connect(server.addr).await;
    let mut second = Client::connect(server.addr).await;
    let SessionEvent::Connected(first_id) = first.next_event().await else {
        panic!("expected connected event");
    };
    let SessionEvent::Connected(second_id) = second.next_event().await else {
        panic!("expected connected event");
    };
    assert!(!first_id.is_empty());
    assert_ne!(first_id, second_id);

    server.stop.send(()).unwrap();
    server.task.await.unwrap();
}

#[tokio::test]
async fn test_execute_with_input_over_tcp() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = Client::connect(server.addr).await;
    assert!(matches!(client.next_event().await, SessionEvent::Connected(_)));

    client
        .execute("python", "read x\necho \"got $x\"\necho warn >&2\n")
        .await;
    client.send(ClientMessage::Input("3\n".to_owned())).await;

    let output = client.output_until("Process exited with code 0").await;
    assert!(output.contains("got 3\n"), "got {output:?}");
    assert!(output.contains("\x1b[31mwarn\n\x1b[0m"), "got {output:?}");

    server.stop.send(()).unwrap();
    server.task.await.unwrap();
}

#[tokio::test]
async fn test_bad_requests_get_error_events() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = Client::connect(server.addr).await;
    assert!(matches!(client.next_event().await, SessionEvent::Connected(_)));

    client.send_raw("this is not json").await;
    assert!(matches!(client.next_event().await, SessionEvent::Error(_)));

    client.execute("ruby", "puts 1").await;
    assert_eq!(
        client.next_event().await,
        SessionEvent::Error("unsupported language 'ruby'".to_owned())
    );

    // The connection stays usable
    client.execute("py", "echo fine\n").await;
    let output = client.output_until("Process exited").await;
    assert!(output.starts_with("fine\n"));

    server.stop.send(()).unwrap();
    server.task.await.unwrap();
}

#[tokio::test]
async fn test_client_disconnect_kills_session() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = Client::connect(server.addr).await;
    assert!(matches!(client.next_event().await, SessionEvent::Connected(_)));

    client.execute("python", "echo started\nexec sleep 30\n").await;
    client.output_until("started").await;
    assert_eq!(server.manager.registry().len(), 1);

    drop(client);

    tokio::time::timeout(TIMEOUT, async {
        while !server.manager.registry().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session not cleaned up after disconnect");
    assert_eq!(workspace_files(dir.path()), 0);

    server.stop.send(()).unwrap();
    server.task.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_terminates_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let server = start_server(dir.path()).await;
    let mut client = Client::connect(server.addr).await;
    assert!(matches!(client.next_event().await, SessionEvent::Connected(_)));

    client.execute("python", "echo started\nexec sleep 30\n").await;
    client.output_until("started").await;

    server.stop.send(()).unwrap();
    tokio::time::timeout(TIMEOUT, server.task)
        .await
        .expect("server did not stop in time")
        .unwrap();

    assert!(server.manager.registry().is_empty());
    assert_eq!(workspace_files(dir.path()), 0);
}
