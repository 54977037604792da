//! Stdio plugin runtime.
//!
//! The host launches the plugin process and talks JSON-lines over its
//! stdin/stdout (see `spamgate-protocol`). Hook invocations arrive as `req`
//! frames; host API calls made by hooks go out as `req` frames and block
//! until the matching `res`. While a call is outstanding the host may invoke
//! another hook on us (an `UpdatePost` triggers `MessageWillBeUpdated`), so
//! the wait loop serves nested requests inline, up to the configured depth.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use {
    async_trait::async_trait,
    serde_json::{Value, json},
    tokio::{
        io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
        sync::Mutex,
    },
    tracing::{debug, info, warn},
};

use {
    spamgate_common::{
        api::{HostError, PluginApi},
        hooks::{HookAction, HookEvent, HookPayload, HookRegistry, HookResponse},
        types::{Channel, ChannelId, Post},
    },
    spamgate_config::{RuntimeConfig, SpamgateConfig},
    spamgate_protocol::{
        ErrorShape, EventFrame, Frame, HelloFrame, LogErrorParams, MAX_FRAME_BYTES,
        PROTOCOL_VERSION, RequestFrame, ResponseFrame, error_codes, events, methods,
    },
};

use crate::reentry::ReentryGauge;

/// Outcome of a host API call: the payload, or the error the host answered.
type Reply = Result<Value, ErrorShape>;

enum Flow {
    Continue,
    Shutdown,
}

/// A plugin session over one reader/writer pair.
pub struct PluginRuntime<R, W> {
    registry: HookRegistry,
    plugin_id: String,
    reader: Mutex<R>,
    writer: Mutex<W>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
    gauge: ReentryGauge,
}

impl<R, W> PluginRuntime<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(registry: HookRegistry, config: &RuntimeConfig, reader: R, writer: W) -> Self {
        Self {
            registry,
            plugin_id: config.plugin_id.clone(),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            next_id: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
            gauge: ReentryGauge::new(config.max_reentry_depth),
        }
    }

    /// Deepest nested hook level served so far.
    pub fn deepest_reentry(&self) -> usize {
        self.gauge.deepest()
    }

    /// Announce the plugin, then serve host requests until EOF or `Shutdown`.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.send_hello().await?;

        while !self.shutting_down.load(Ordering::SeqCst) {
            let Some(frame) = self.next_frame().await? else {
                info!("host closed the connection");
                break;
            };
            match frame {
                Frame::Request(req) => {
                    if let Flow::Shutdown = self.serve_request(req, false).await? {
                        info!("shutdown requested by host");
                        break;
                    }
                },
                Frame::Response(res) => {
                    warn!(id = %res.id, "response with no outstanding call, dropping");
                },
                Frame::Hello(_) | Frame::Event(_) => debug!("ignoring unsolicited frame"),
            }
        }

        for (name, stats) in self.registry.stats_snapshot() {
            info!(
                hook = %name,
                calls = stats.calls,
                replaced = stats.replaced,
                rejected = stats.rejected,
                failed = stats.failed,
                avg_latency_us = stats.avg_latency_us,
                "hook stats"
            );
        }
        Ok(())
    }

    async fn send_hello(&self) -> Result<(), HostError> {
        let hooks: Vec<String> = self
            .registry
            .events()
            .iter()
            .map(ToString::to_string)
            .collect();
        info!(plugin_id = %self.plugin_id, hooks = ?hooks, "registering with host");
        self.write_frame(&Frame::Hello(HelloFrame {
            protocol: PROTOCOL_VERSION,
            plugin_id: self.plugin_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hooks,
        }))
        .await
    }

    /// Answer one request from the host. `nested` is set when the request
    /// arrived while one of our own host calls was outstanding.
    async fn serve_request(&self, req: RequestFrame, nested: bool) -> Result<Flow, HostError> {
        if req.method == methods::SHUTDOWN {
            self.shutting_down.store(true, Ordering::SeqCst);
            self.respond(req.id, Ok(Value::Null)).await?;
            return Ok(Flow::Shutdown);
        }

        let Some(event) = HookEvent::from_method(&req.method) else {
            warn!(method = %req.method, "host invoked an unknown method");
            let error = ErrorShape::new(
                error_codes::UNKNOWN_METHOD,
                format!("unknown method: {}", req.method),
            );
            self.respond(req.id, Err(error)).await?;
            return Ok(Flow::Continue);
        };

        let payload = match HookPayload::from_params(event, req.params.unwrap_or(Value::Null)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(event = %event, error = %e, "invalid hook params");
                let error = ErrorShape::new(error_codes::INVALID_REQUEST, e.to_string());
                self.respond(req.id, Err(error)).await?;
                return Ok(Flow::Continue);
            },
        };

        let guard = if nested {
            match self.gauge.enter() {
                Ok(guard) => Some(guard),
                Err(e) => {
                    warn!(event = %event, error = %e, "nested hook refused, passing message unchanged");
                    let response = payload.resolve(HookAction::Continue);
                    self.respond(req.id, encode_response(event, &response))
                        .await?;
                    return Ok(Flow::Continue);
                },
            }
        } else {
            None
        };

        debug!(id = %req.id, event = %event, nested, depth = self.gauge.current(), "serving hook");
        let response = self.registry.dispatch(self, &payload).await;
        drop(guard);

        self.respond(req.id, encode_response(event, &response))
            .await?;
        Ok(Flow::Continue)
    }

    /// Send a request to the host and wait for its answer, serving any hook
    /// requests that arrive in between.
    async fn call(&self, method: &str, params: Value) -> Result<Reply, HostError> {
        let id = format!(
            "{}-{}",
            self.plugin_id,
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        );
        debug!(id = %id, method, "calling host");
        self.write_frame(&Frame::Request(RequestFrame::new(id.clone(), method, params)))
            .await?;

        loop {
            match self.next_frame().await? {
                None => return Err(HostError::Closed),
                Some(Frame::Response(res)) if res.id == id => return Ok(res.into_result()),
                Some(Frame::Response(res)) => {
                    warn!(id = %res.id, expected = %id, "response for another call, dropping");
                },
                Some(Frame::Request(req)) => {
                    if let Flow::Shutdown = self.serve_request(req, true).await? {
                        return Err(HostError::Closed);
                    }
                },
                Some(Frame::Hello(_) | Frame::Event(_)) => debug!("ignoring unsolicited frame"),
            }
        }
    }

    async fn respond(&self, id: String, reply: Reply) -> Result<(), HostError> {
        let frame = match reply {
            Ok(payload) => ResponseFrame::ok(id, payload),
            Err(error) => ResponseFrame::err(id, error),
        };
        self.write_frame(&Frame::Response(frame)).await
    }

    /// Next well-formed frame, or `None` at EOF.
    ///
    /// Oversized lines, lines that are not UTF-8 and lines that do not parse
    /// are skipped. At most `MAX_FRAME_BYTES + 1` bytes of a line are buffered.
    async fn next_frame(&self) -> Result<Option<Frame>, HostError> {
        let mut reader = self.reader.lock().await;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = (&mut *reader)
                .take(MAX_FRAME_BYTES as u64 + 1)
                .read_until(b'\n', &mut buf)
                .await
                .map_err(transport)?;
            if read == 0 {
                return Ok(None);
            }
            if buf.len() > MAX_FRAME_BYTES && buf.last() != Some(&b'\n') {
                let dropped = buf.len() + discard_line(&mut *reader).await?;
                warn!(bytes = dropped, max = MAX_FRAME_BYTES, "skipping oversized frame");
                continue;
            }
            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(error = %e, "skipping frame that is not UTF-8");
                    continue;
                },
            };
            if line.is_empty() {
                continue;
            }
            match Frame::from_line(line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!(error = %e, "skipping malformed frame"),
            }
        }
    }

    async fn write_frame(&self, frame: &Frame) -> Result<(), HostError> {
        let line = frame
            .to_line()
            .map_err(|e| HostError::Protocol(e.to_string()))?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await.map_err(transport)?;
        writer.flush().await.map_err(transport)
    }
}

#[async_trait]
impl<R, W> PluginApi for PluginRuntime<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Channel, HostError> {
        let reply = self
            .call(methods::GET_CHANNEL, json!({ "channel_id": channel_id }))
            .await?;
        let value = reply.map_err(|e| host_error(e, || HostError::channel_not_found(channel_id)))?;
        decode(value)
    }

    async fn update_post(&self, post: Post) -> Result<Post, HostError> {
        let id = post.id.clone();
        let post = serde_json::to_value(post).map_err(|e| HostError::Protocol(e.to_string()))?;
        let reply = self
            .call(methods::UPDATE_POST, json!({ "post": post }))
            .await?;
        let value = reply.map_err(|e| host_error(e, || HostError::post_not_found(&id)))?;
        decode(value)
    }

    async fn log_error(&self, message: &str, key: &str, value: &str) {
        debug!(key, value, "forwarding error to host: {message}");
        let params = LogErrorParams {
            message: message.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        };
        let frame = Frame::Event(EventFrame {
            event: events::LOG_ERROR.to_string(),
            payload: serde_json::to_value(params).ok(),
        });
        if let Err(e) = self.write_frame(&frame).await {
            warn!(error = %e, "could not forward error to host: {message}");
        }
    }
}

/// Serve the registry's hooks over the process's stdin/stdout.
pub async fn client_main(registry: HookRegistry, config: &SpamgateConfig) -> anyhow::Result<()> {
    let runtime = PluginRuntime::new(
        registry,
        &config.runtime,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );
    runtime.run().await
}

/// Read-only events carry no verdict; the others send the full response.
fn encode_response(event: HookEvent, response: &HookResponse) -> Reply {
    if event.is_read_only() {
        return Ok(json!({}));
    }
    serde_json::to_value(response).map_err(|e| ErrorShape::new(error_codes::INTERNAL, e.to_string()))
}

fn host_error(error: ErrorShape, not_found: impl FnOnce() -> HostError) -> HostError {
    match error.code.as_str() {
        error_codes::NOT_FOUND => not_found(),
        error_codes::REJECTED => HostError::Rejected(error.message),
        code => HostError::Transport(format!("{code}: {}", error.message)),
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, HostError> {
    serde_json::from_value(value).map_err(|e| HostError::Protocol(e.to_string()))
}

/// Consume the rest of the current line, newline included. Returns the
/// number of bytes thrown away.
async fn discard_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<usize, HostError> {
    let mut dropped = 0;
    loop {
        let chunk = reader.fill_buf().await.map_err(transport)?;
        if chunk.is_empty() {
            return Ok(dropped);
        }
        let (used, done) = match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (chunk.len(), false),
        };
        reader.consume(used);
        dropped += used;
        if done {
            return Ok(dropped);
        }
    }
}

fn transport(e: std::io::Error) -> HostError {
    HostError::Transport(e.to_string())
}
