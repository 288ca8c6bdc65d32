//! Stream Ansible runner events from a JSONL file (or stdin) and print one line per event.
//!
//! Flags:
//! - `--sample` to replay bundled demo events.
//! - `--log` to report undecodable lines instead of dropping them silently.
//! - Otherwise pass a path, or pipe the runner's callback output on stdin.
//!
//! Example:
//! ```bash
//! cargo run -p ansible_events --example stream_playbook -- --sample
//! RUST_LOG=ansible_events=debug cargo run -p ansible_events --example stream_playbook -- run.jsonl --log
//! ```

use std::{env, error::Error, io::Cursor};

use ansible_events::{event_stream, AnsibleEvent, DecodeErrorPolicy, StreamConfig};
use tokio::io::AsyncRead;
use tracing_subscriber::EnvFilter;

const SAMPLE_EVENTS: &[&str] = &[
    r#"{"eventType":"PLAYBOOK_START","eventData":{"name":"kubernetes.yaml","count":2}}"#,
    r#"{"eventType":"PLAY_START","eventData":{"name":"etcd"}}"#,
    r#"{"eventType":"TASK_START","eventData":{"name":"install etcd"}}"#,
    r#"{"eventType":"RUNNER_ITEM_RETRY","eventData":{"host":"etcd01","result":{"msg":"waiting for etcd","attempts":1,"retries":3}}}"#,
    r#"{"eventType":"RUNNER_OK","eventData":{"host":"etcd01","result":{"changed":true}}}"#,
    r#"this line is not json"#,
    r#"{"eventType":"PLAY_START","eventData":{"name":"master"}}"#,
    r#"{"eventType":"RUNNER_UNREACHABLE","eventData":{"host":"master01","result":{"msg":"ssh timeout","unreachable":true}}}"#,
    r#"{"eventType":"PLAYBOOK_END","eventData":{"name":"kubernetes.yaml"}}"#,
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let use_sample = take_flag(&mut args, "--sample");
    let policy = if take_flag(&mut args, "--log") {
        DecodeErrorPolicy::Log
    } else {
        DecodeErrorPolicy::Drop
    };

    let source: Box<dyn AsyncRead + Unpin + Send> = if use_sample {
        let mut sample = SAMPLE_EVENTS.join("\n");
        sample.push('\n');
        Box::new(Cursor::new(sample.into_bytes()))
    } else if let Some(path) = args.first() {
        Box::new(tokio::fs::File::open(path).await?)
    } else {
        Box::new(tokio::io::stdin())
    };

    let mut events = event_stream(source, StreamConfig::new().decode_errors(policy));
    while let Some(event) = events.recv().await {
        println!("{}", describe(&event));
    }

    let summary = events.finish().await?;
    eprintln!(
        "read {} lines, {} events, {} dropped ({:?})",
        summary.lines_read, summary.events_published, summary.lines_dropped, summary.termination
    );
    Ok(())
}

fn describe(event: &AnsibleEvent) -> String {
    match event {
        AnsibleEvent::PlaybookStart(start) => {
            format!("playbook {} ({} plays)", start.name, start.count)
        }
        AnsibleEvent::PlaybookEnd(end) => format!("playbook {} done", end.name),
        AnsibleEvent::PlayStart(play) => format!("  play {}", play.name),
        AnsibleEvent::TaskStart(task) => format!("    task {}", task.name),
        AnsibleEvent::HandlerTaskStart(task) => format!("    handler {}", task.name),
        other => {
            let tag = other.kind().tag();
            match other.runner_result() {
                Some(res) if res.result.message.is_empty() => format!("      {tag} {}", res.host),
                Some(res) => format!("      {tag} {}: {}", res.host, res.result.message),
                None => format!("      {tag}"),
            }
        }
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|arg| arg != flag);
    before != args.len()
}
