use async_trait::async_trait;
use flate2::read::ZlibDecoder;
use journald_to_gelf::transport::UdpTransport;
use journald_to_gelf::{
    Config, GelfError, GelfTransport, LineOutcome, PipelineRunner, PipelineState, Protocol, Result,
};
use serde_json::{json, Value};
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::UdpSocket;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct RecordingTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    closes: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
}

impl RecordingTransport {
    fn failing_first(count: usize) -> Self {
        let transport = Self::default();
        transport.failures_left.store(count, Ordering::SeqCst);
        transport
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|payload| serde_json::from_slice(payload).unwrap())
            .collect()
    }
}

#[async_trait]
impl GelfTransport for RecordingTransport {
    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(GelfError::Delivery("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(payload.to_vec());
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn runner(config: Config) -> (PipelineRunner, RecordingTransport) {
    let transport = RecordingTransport::default();
    let runner = PipelineRunner::new(&config, Box::new(transport.clone())).unwrap();
    (runner, transport)
}

async fn run_input(runner: &mut PipelineRunner, input: &str) {
    let reader = BufReader::new(input.as_bytes());
    assert_ok!(runner.run(reader, CancellationToken::new()).await);
}

#[tokio::test]
async fn test_end_to_end_udp_payloads() {
    let (mut runner, transport) = runner(Config::default());

    let input = concat!(
        r#"{"__REALTIME_TIMESTAMP":"1610000000000000","PRIORITY":"6","_HOSTNAME":"web-1","SYSLOG_IDENTIFIER":"sshd","MESSAGE":"Accepted publickey","_PID":"812"}"#,
        "\n",
        r#"{"MESSAGE":"{\"message\":\"hi\",\"code\":7}"}"#,
        "\n",
    );
    run_input(&mut runner, input).await;

    let sent = transport.sent_json();
    assert_eq!(sent.len(), 2);

    assert_eq!(
        sent[0],
        json!({
            "version": "1.1",
            "timestamp": 1610000000.0,
            "level": 6,
            "host": "web-1",
            "short_message": "Accepted publickey",
            "_syslog_identifier": "sshd"
        })
    );

    assert_eq!(sent[1]["version"], "1.1");
    assert_eq!(sent[1]["short_message"], "hi");
    assert_eq!(sent[1]["_code"], 7);
    assert_eq!(sent[1]["_loglevel"], "notice");
    assert!(sent[1].get("code").is_none());
    assert!(sent[1].get("message").is_none());

    assert_eq!(runner.stats().sent, 2);
    assert_eq!(runner.state(), PipelineState::Idle);
}

#[tokio::test]
async fn test_bad_lines_do_not_stop_the_pipeline() {
    let (mut runner, transport) = runner(Config::default());

    let input = "not json\n\n   \n[1,2]\n{\"MESSAGE\":\"after the garbage\"}\n";
    run_input(&mut runner, input).await;

    let sent = transport.sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["short_message"], "after the garbage");

    let stats = runner.stats();
    assert_eq!(stats.lines_read, 5);
    assert_eq!(stats.decode_failures, 2);
    assert_eq!(stats.sent, 1);
}

#[tokio::test]
async fn test_messages_keep_input_order() {
    let (mut runner, transport) = runner(Config::default());

    let input: String = (0..20)
        .map(|i| format!("{{\"MESSAGE\":\"line {}\"}}\n", i))
        .collect();
    run_input(&mut runner, &input).await;

    let order: Vec<String> = transport
        .sent_json()
        .iter()
        .map(|message| message["short_message"].as_str().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (0..20).map(|i| format!("line {}", i)).collect();
    assert_eq!(order, expected);
}

#[tokio::test]
async fn test_filters_and_environment() {
    let config = Config {
        filters: Some("sshd".to_string()),
        environment: Some("production".to_string()),
        ..Config::default()
    };
    let (mut runner, transport) = runner(config);

    let input = concat!(
        r#"{"SYSLOG_IDENTIFIER":"sshd","MESSAGE":"kept"}"#,
        "\n",
        r#"{"SYSLOG_IDENTIFIER":"cron","MESSAGE":"filtered"}"#,
        "\n",
        r#"{"MESSAGE":"no identifier, filtered"}"#,
        "\n",
        r#"{"SYSLOG_IDENTIFIER":"sshd","MESSAGE":"{\"message\":\"x\",\"environment\":\"dev\"}"}"#,
        "\n",
    );
    run_input(&mut runner, input).await;

    let sent = transport.sent_json();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["short_message"], "kept");
    assert_eq!(sent[0]["_environment"], "production");
    assert_eq!(sent[1]["_environment"], "production");
    assert_eq!(runner.stats().filtered, 2);
}

#[tokio::test]
async fn test_json_only_mode() {
    let config = Config {
        json_only: true,
        ..Config::default()
    };
    let (mut runner, transport) = runner(config);

    let mut outcome = runner.process_line(r#"{"MESSAGE":"boot ok"}"#).await;
    assert_eq!(outcome, LineOutcome::Dropped);

    outcome = runner.process_line(r#"{"MESSAGE":"{\"message\":\"structured\"}"}"#).await;
    assert_eq!(outcome, LineOutcome::Sent);

    let sent = transport.sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["short_message"], "structured");
}

#[tokio::test]
async fn test_plain_message_without_json_only() {
    let (mut runner, transport) = runner(Config::default());

    assert_eq!(runner.process_line(r#"{"MESSAGE":"boot ok"}"#).await, LineOutcome::Sent);
    assert_eq!(transport.sent_json()[0]["short_message"], "boot ok");
}

#[tokio::test]
async fn test_byte_array_message_is_decoded() {
    let (mut runner, transport) = runner(Config::default());

    assert_eq!(runner.process_line(r#"{"MESSAGE":[72,105]}"#).await, LineOutcome::Sent);
    assert_eq!(transport.sent_json()[0]["short_message"], "Hi");
}

#[tokio::test]
async fn test_tcp_payloads_are_compressed() {
    for protocol in [Protocol::Tcp, Protocol::Tls] {
        let config = Config {
            protocol,
            ..Config::default()
        };
        let (mut runner, transport) = runner(config);

        assert_eq!(runner.process_line(r#"{"MESSAGE":"zipped"}"#).await, LineOutcome::Sent);

        let sent = transport.sent();
        let mut json = String::new();
        ZlibDecoder::new(sent[0].as_slice())
            .read_to_string(&mut json)
            .unwrap();
        let message: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(message["short_message"], "zipped");
    }
}

#[tokio::test]
async fn test_delivery_failure_does_not_stop_pipeline() {
    let transport = RecordingTransport::failing_first(1);
    let mut runner = PipelineRunner::new(&Config::default(), Box::new(transport.clone())).unwrap();

    run_input(&mut runner, "{\"MESSAGE\":\"lost\"}\n{\"MESSAGE\":\"delivered\"}\n").await;

    let sent = transport.sent_json();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["short_message"], "delivered");
    assert_eq!(runner.stats().delivery_failures, 1);
}

#[tokio::test]
async fn test_shutdown_while_idle_closes_transport_once() {
    let (mut runner, transport) = runner(Config::default());

    // keep the writer open so the runner sits idle waiting for input
    let (mut writer, reader) = tokio::io::duplex(1024);
    writer.write_all(b"{\"MESSAGE\":\"before signal\"}\n").await.unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    assert_ok!(runner.run(BufReader::new(reader), token).await);
    assert_eq!(transport.sent_json().len(), 1);

    runner.shutdown().await;
    runner.shutdown().await;

    assert_eq!(runner.state(), PipelineState::ShuttingDown);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    drop(writer);
}

#[tokio::test]
async fn test_cancelled_token_stops_before_reading() {
    let (mut runner, transport) = runner(Config::default());

    let token = CancellationToken::new();
    token.cancel();

    let reader = BufReader::new(&b"{\"MESSAGE\":\"never read\"}\n"[..]);
    assert_ok!(runner.run(reader, token).await);

    assert!(transport.sent().is_empty());
    assert_eq!(runner.stats().lines_read, 0);
}

#[tokio::test]
async fn test_udp_transport_end_to_end() {
    let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = receiver.local_addr().unwrap().port();

    let config = Config {
        host: "127.0.0.1".to_string(),
        port,
        no_udp_compression: true,
        ..Config::default()
    };
    let transport = UdpTransport::connect(&config.host, config.port, config.udp_chunk_size, false)
        .await
        .unwrap();
    let mut runner = PipelineRunner::new(&config, Box::new(transport)).unwrap();

    assert_eq!(
        runner.process_line(r#"{"MESSAGE":"over the wire","_HOSTNAME":"db-1"}"#).await,
        LineOutcome::Sent
    );

    let mut buf = [0u8; 2048];
    let len = receiver.recv(&mut buf).await.unwrap();
    let message: Value = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(message["short_message"], "over the wire");
    assert_eq!(message["host"], "db-1");

    runner.shutdown().await;
}

/// Accepts the connection but never completes a send
#[derive(Clone, Default)]
struct StuckTransport {
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl GelfTransport for StuckTransport {
    async fn send(&mut self, _payload: &[u8]) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_shutdown_abandons_stuck_send() {
    let transport = StuckTransport::default();
    let mut runner = PipelineRunner::new(&Config::default(), Box::new(transport.clone())).unwrap();

    let (mut writer, reader) = tokio::io::duplex(1024);
    writer.write_all(b"{\"MESSAGE\":\"never acknowledged\"}\n").await.unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let run = tokio::time::timeout(Duration::from_secs(2), runner.run(BufReader::new(reader), token)).await;
    assert_ok!(assert_ok!(run));
    assert_eq!(runner.stats().sent, 0);

    runner.shutdown().await;
    assert_eq!(runner.state(), PipelineState::ShuttingDown);
    assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    drop(writer);
}
