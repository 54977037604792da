//! Scripted host conversations with the stdio runtime over in-memory pipes.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use {
    serde_json::{Value, json},
    spamgate_config::SpamgateConfig,
    spamgate_plugins::{PluginRuntime, default_registry},
    spamgate_protocol::{
        ErrorShape, Frame, RequestFrame, ResponseFrame, error_codes, events, methods,
    },
    tokio::io::{
        AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf,
        WriteHalf,
    },
};

const PLACEHOLDER: &str = "I have successfully edited this message";
const REJECTION: &str = "Error 500: Internal server error. Please contact your website \
                         administrator with detais on this message.";

type Plugin = PluginRuntime<BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>>;

/// The host's ends of the pipes.
struct Host {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Host {
    async fn recv(&mut self) -> Frame {
        let line = self.lines.next_line().await.unwrap().expect("plugin hung up");
        Frame::from_line(&line).unwrap()
    }

    async fn recv_request(&mut self, method: &str) -> RequestFrame {
        match self.recv().await {
            Frame::Request(req) if req.method == method => req,
            other => panic!("expected {method} request, got {other:?}"),
        }
    }

    async fn recv_response(&mut self, id: &str) -> ResponseFrame {
        match self.recv().await {
            Frame::Response(res) if res.id == id => res,
            other => panic!("expected response {id}, got {other:?}"),
        }
    }

    async fn send(&mut self, frame: Frame) {
        send(&mut self.writer, frame).await;
    }

    async fn request(&mut self, id: &str, method: &str, params: Value) {
        self.send(Frame::Request(RequestFrame::new(id, method, params)))
            .await;
    }

    async fn answer_channel(&mut self, name: &str) {
        let req = self.recv_request(methods::GET_CHANNEL).await;
        let id = req.params.as_ref().unwrap()["channel_id"].clone();
        self.send(Frame::Response(ResponseFrame::ok(
            req.id,
            json!({ "id": id, "name": name }),
        )))
        .await;
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, frame: Frame) {
    writer
        .write_all(frame.to_line().unwrap().as_bytes())
        .await
        .unwrap();
    writer.flush().await.unwrap();
}

fn connect() -> (Plugin, Host) {
    connect_with(&SpamgateConfig::default())
}

fn connect_with(config: &SpamgateConfig) -> (Plugin, Host) {
    let (plugin_side, host_side) = tokio::io::duplex(64 * 1024);
    let (plugin_read, plugin_write) = tokio::io::split(plugin_side);
    let (host_read, host_write) = tokio::io::split(host_side);

    let plugin = PluginRuntime::new(
        default_registry(config),
        &config.runtime,
        BufReader::new(plugin_read),
        plugin_write,
    );
    let host = Host {
        lines: BufReader::new(host_read).lines(),
        writer: host_write,
    };
    (plugin, host)
}

fn spam_post(id: &str, message: &str) -> Value {
    json!({ "id": id, "channel_id": "c-spam", "user_id": "u1", "message": message })
}

#[tokio::test]
async fn full_moderation_conversation() {
    let (plugin, mut host) = connect();

    let script = async {
        let Frame::Hello(hello) = host.recv().await else {
            panic!("expected hello first");
        };
        assert_eq!(hello.plugin_id, "spamgate");
        assert_eq!(hello.hooks.len(), 3);

        // Creation: the body is replaced by the placeholder.
        host.request("h1", "MessageWillBePosted", json!({ "post": spam_post("", "hello") }))
            .await;
        host.answer_channel("random_spam").await;
        let res = host.recv_response("h1").await;
        assert!(res.ok);
        let payload = res.payload.unwrap();
        assert_eq!(payload["post"]["message"], PLACEHOLDER);
        assert_eq!(payload["rejection_reason"], "");

        // Commit: the plugin tries to rewrite the stored post.
        let stored = spam_post("p1", PLACEHOLDER);
        host.request("h2", "MessageHasBeenPosted", json!({ "post": stored }))
            .await;
        host.answer_channel("random_spam").await;
        let update = host.recv_request(methods::UPDATE_POST).await;
        let rewrite = update.params.as_ref().unwrap()["post"].clone();
        assert_eq!(rewrite["message"], "Lorem ipsum dolor sit amet");

        // The host runs the update hook before answering UpdatePost.
        host.request(
            "h3",
            "MessageWillBeUpdated",
            json!({ "new_post": rewrite, "old_post": stored }),
        )
        .await;
        host.answer_channel("random_spam").await;
        let res = host.recv_response("h3").await;
        let payload = res.payload.unwrap();
        assert_eq!(payload["post"]["id"], "p1");
        assert_eq!(payload["post"]["message"], PLACEHOLDER);
        assert_eq!(payload["rejection_reason"], REJECTION);

        host.send(Frame::Response(ResponseFrame::err(
            update.id,
            ErrorShape::new(error_codes::REJECTED, REJECTION),
        )))
        .await;
        let res = host.recv_response("h2").await;
        assert!(res.ok);
        assert_eq!(res.payload.unwrap(), json!({}));

        host.request("bye", methods::SHUTDOWN, Value::Null).await;
        assert!(host.recv_response("bye").await.ok);
    };

    let (result, ()) = tokio::join!(plugin.run(), script);
    result.unwrap();
    assert_eq!(plugin.deepest_reentry(), 1);
}

#[tokio::test]
async fn sentinel_post_is_flagged_over_the_wire() {
    let (plugin, mut host) = connect();

    let script = async {
        host.recv().await;
        host.request("h1", "MessageWillBePosted", json!({ "post": spam_post("", "~hi") }))
            .await;
        host.answer_channel("random_spam").await;
        let payload = host.recv_response("h1").await.payload.unwrap();
        assert_eq!(payload["post"]["message"], "hi");
        assert_eq!(payload["post"]["props"]["randomSpamLetPass"], true);

        host.writer.shutdown().await.unwrap();
    };

    let (result, ()) = tokio::join!(plugin.run(), script);
    result.unwrap();
    assert_eq!(plugin.deepest_reentry(), 0);
}

#[tokio::test]
async fn update_outside_the_channel_returns_every_field() {
    let (plugin, mut host) = connect();

    let new_post = json!({
        "id": "p1",
        "channel_id": "c-gen",
        "user_id": "u1",
        "message": "edit",
        "root_id": "thread-9",
        "edit_at": 1_700_000_000_123_u64,
        "props": {
            "from_webhook": "true",
            "attachments": [{ "text": "build failed", "color": "#ff0000" }]
        }
    });

    let script = async {
        host.recv().await;
        host.request(
            "h1",
            "MessageWillBeUpdated",
            json!({ "new_post": new_post, "old_post": { "id": "p1", "channel_id": "c-gen" } }),
        )
        .await;
        host.answer_channel("general").await;
        let payload = host.recv_response("h1").await.payload.unwrap();
        assert_eq!(payload["post"], new_post);
        assert_eq!(payload["rejection_reason"], "");

        host.writer.shutdown().await.unwrap();
    };

    let (result, ()) = tokio::join!(plugin.run(), script);
    result.unwrap();
}

#[tokio::test]
async fn placeholder_keeps_thread_and_attachments() {
    let (plugin, mut host) = connect();

    let script = async {
        host.recv().await;
        let reply = json!({
            "channel_id": "c-spam",
            "user_id": "u1",
            "message": "hello",
            "root_id": "thread-9",
            "props": { "attachments": [{ "text": "chart" }] }
        });
        host.request("h1", "MessageWillBePosted", json!({ "post": reply }))
            .await;
        host.answer_channel("random_spam").await;
        let payload = host.recv_response("h1").await.payload.unwrap();
        assert_eq!(payload["post"]["message"], PLACEHOLDER);
        assert_eq!(payload["post"]["root_id"], "thread-9");
        assert_eq!(payload["post"]["props"]["attachments"][0]["text"], "chart");

        host.writer.shutdown().await.unwrap();
    };

    let (result, ()) = tokio::join!(plugin.run(), script);
    result.unwrap();
}

#[tokio::test]
async fn missing_channel_is_logged_and_passed() {
    let (plugin, mut host) = connect();

    let script = async {
        host.recv().await;
        host.request("h1", "MessageWillBePosted", json!({ "post": spam_post("", "hello") }))
            .await;
        let lookup = host.recv_request(methods::GET_CHANNEL).await;
        host.send(Frame::Response(ResponseFrame::err(
            lookup.id,
            ErrorShape::new(error_codes::NOT_FOUND, "no such channel"),
        )))
        .await;

        let Frame::Event(event) = host.recv().await else {
            panic!("expected LogError event");
        };
        assert_eq!(event.event, events::LOG_ERROR);
        assert_eq!(
            event.payload.unwrap(),
            json!({ "message": "could not find channel", "key": "channel_id", "value": "c-spam" })
        );

        let payload = host.recv_response("h1").await.payload.unwrap();
        assert_eq!(payload["post"], Value::Null);
        assert_eq!(payload["rejection_reason"], "");

        host.writer.shutdown().await.unwrap();
    };

    let (result, ()) = tokio::join!(plugin.run(), script);
    result.unwrap();
}

#[tokio::test]
async fn hangup_during_call_fails_open() {
    let (plugin, mut host) = connect();

    let script = async {
        host.recv().await;
        host.request("h1", "MessageWillBePosted", json!({ "post": spam_post("", "hello") }))
            .await;
        host.recv_request(methods::GET_CHANNEL).await;
        host.writer.shutdown().await.unwrap();

        // The lookup failure is reported, then the hook answers unchanged.
        assert!(matches!(host.recv().await, Frame::Event(_)));
        let payload = host.recv_response("h1").await.payload.unwrap();
        assert_eq!(payload["post"], Value::Null);
    };

    let (result, ()) = tokio::join!(plugin.run(), script);
    result.unwrap();
}

#[tokio::test]
async fn nested_requests_past_the_limit_pass_unchanged() {
    let mut config = SpamgateConfig::default();
    config.runtime.max_reentry_depth = 1;
    let (plugin, mut host) = connect_with(&config);

    let script = async {
        host.recv().await;
        host.request("h1", "MessageWillBePosted", json!({ "post": spam_post("", "hello") }))
            .await;
        // While the lookups are outstanding, nest two levels of update hooks.
        let outer = host.recv_request(methods::GET_CHANNEL).await;
        let update = json!({
            "new_post": spam_post("p1", "edited"),
            "old_post": spam_post("p1", PLACEHOLDER),
        });
        host.request("n1", "MessageWillBeUpdated", update.clone())
            .await;
        let inner = host.recv_request(methods::GET_CHANNEL).await;
        host.request("n2", "MessageWillBeUpdated", update).await;

        // Level two is past the limit: answered without running the hook.
        let payload = host.recv_response("n2").await.payload.unwrap();
        assert_eq!(payload["post"]["message"], "edited");
        assert_eq!(payload["rejection_reason"], "");

        // Level one runs normally and rejects the unflagged edit.
        host.send(Frame::Response(ResponseFrame::ok(
            inner.id,
            json!({ "id": "c-spam", "name": "random_spam" }),
        )))
        .await;
        let payload = host.recv_response("n1").await.payload.unwrap();
        assert_eq!(payload["post"]["message"], PLACEHOLDER);
        assert_eq!(payload["rejection_reason"], REJECTION);

        host.send(Frame::Response(ResponseFrame::ok(
            outer.id,
            json!({ "id": "c-spam", "name": "random_spam" }),
        )))
        .await;
        let payload = host.recv_response("h1").await.payload.unwrap();
        assert_eq!(payload["post"]["message"], PLACEHOLDER);

        host.writer.shutdown().await.unwrap();
    };

    let (result, ()) = tokio::join!(plugin.run(), script);
    result.unwrap();
    assert_eq!(plugin.deepest_reentry(), 1);
}

#[tokio::test]
async fn unknown_method_and_stray_response_do_not_stop_the_session() {
    let (plugin, mut host) = connect();

    let script = async {
        host.recv().await;
        host.send(Frame::Response(ResponseFrame::ok("nobody-asked", Value::Null)))
            .await;
        host.request("h1", "OnConfigurationChange", Value::Null)
            .await;
        let res = host.recv_response("h1").await;
        assert_eq!(res.error.unwrap().code, error_codes::UNKNOWN_METHOD);

        host.request("bye", methods::SHUTDOWN, Value::Null).await;
        assert!(host.recv_response("bye").await.ok);
    };

    let (result, ()) = tokio::join!(plugin.run(), script);
    result.unwrap();
}
