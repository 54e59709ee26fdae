//! RPC server
//!
//! Serves exactly one host connection. Every request runs on its own task
//! with a cancel token taken from the server's current [`CancelSource`];
//! responses are funnelled through a single writer task.
//!
//! | Method | Params | Result |
//! |---|---|---|
//! | `GetSchema` | | provider, resource and data source schemas |
//! | `Configure` | `config`, `host_version` | `{}` |
//! | `ValidateResource` | `type_name`, `config`, `data_source` | `{}` |
//! | `PlanResourceChange` | `type_name`, `prior_state`, `config` | planned change |
//! | `ApplyResourceChange` | `type_name`, `prior_state`, `planned_state` | `new_state` |
//! | `ReadResource` | `type_name`, `state` | `new_state` |
//! | `ImportResourceState` | `type_name`, `id` | `imported` |
//! | `ReadDataSource` | `type_name`, `config` | `state` |
//! | `Stop` | | `{}`; cancels every in-flight request |

use crate::error::{Result, RpcError};
use crate::wire::{
    ApplyParams, ConfigureParams, DataSourceParams, ErrorBody, ImportParams, PlanParams,
    ReadParams, Request, Response, ValidateParams,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use stratoform_provider::Provider;
use stratoform_transport::{CancelSource, CancelToken};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// Binds the listener the handshake announces; loopback on a free port
/// unless an address is given.
pub async fn bind(listen: Option<SocketAddr>) -> Result<TcpListener> {
    let addr = listen.unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 0)));
    Ok(TcpListener::bind(addr).await?)
}

pub struct Server {
    provider: Provider,
    cancel: Mutex<CancelSource>,
}

impl Server {
    pub fn new(provider: Provider) -> Arc<Self> {
        Arc::new(Self {
            provider,
            cancel: Mutex::new(CancelSource::new()),
        })
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Accepts the host's connection and serves it until EOF.
    pub async fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "Host connected");
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        self.serve_connection(reader, writer).await
    }

    /// Serves newline-delimited requests read from `reader`.
    pub async fn serve_connection<R, W>(self: &Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Response>();
        let writer_task = tokio::spawn(write_responses(writer, rx));

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let request: Request = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!(error = %e, "Malformed request");
                    let body = ErrorBody::protocol(format!("malformed request: {e}"));
                    let _ = tx.send(Response {
                        id: Value::Null,
                        result: None,
                        error: Some(body),
                    });
                    continue;
                }
            };

            // Handled inline so it never queues behind the work it cancels.
            if request.method == "Stop" {
                self.stop().await;
                let _ = tx.send(Response::ok(request.id, json!({})));
                continue;
            }

            let cancel = self.cancel.lock().await.token();
            let server = Arc::clone(self);
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = server.dispatch(request, &cancel).await;
                let _ = tx.send(response);
            });
        }

        info!("Host disconnected");
        self.stop().await;
        drop(tx);
        writer_task
            .await
            .map_err(|e| RpcError::Protocol(format!("response writer failed: {e}")))
    }

    /// Cancels every in-flight request; later requests get a fresh token.
    pub async fn stop(&self) {
        let mut source = self.cancel.lock().await;
        source.cancel();
        *source = CancelSource::new();
        debug!("In-flight requests cancelled");
    }

    async fn dispatch(&self, request: Request, cancel: &CancelToken) -> Response {
        let Request { id, method, params } = request;
        debug!(%id, method, "Request");
        match self.call(&method, params, cancel).await {
            Ok(result) => Response::ok(id, result),
            Err(error) => {
                warn!(%id, method, code = %error.code, message = %error.message, "Request failed");
                Response {
                    id,
                    result: None,
                    error: Some(error),
                }
            }
        }
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        cancel: &CancelToken,
    ) -> std::result::Result<Value, ErrorBody> {
        let provider = &self.provider;
        match method {
            "GetSchema" => Ok(provider.schema()),
            "Configure" => {
                let p: ConfigureParams = if params.is_null() {
                    ConfigureParams::default()
                } else {
                    parse(params)?
                };
                provider.configure(&p.config, &p.host_version, cancel).await?;
                Ok(json!({}))
            }
            "ValidateResource" => {
                let p: ValidateParams = parse(params)?;
                if p.data_source {
                    provider.validate_data_source(&p.type_name, &p.config)?;
                } else {
                    provider.validate_resource(&p.type_name, &p.config)?;
                }
                Ok(json!({}))
            }
            "PlanResourceChange" => {
                let p: PlanParams = parse(params)?;
                let change = provider
                    .plan_resource_change(&p.type_name, &p.prior_state, &p.config, cancel)
                    .await?;
                serde_json::to_value(change)
                    .map_err(|e| ErrorBody::protocol(format!("cannot encode plan: {e}")))
            }
            "ApplyResourceChange" => {
                let p: ApplyParams = parse(params)?;
                let state = provider
                    .apply_resource_change(&p.type_name, &p.prior_state, &p.planned_state, cancel)
                    .await?;
                Ok(json!({ "new_state": state }))
            }
            "ReadResource" => {
                let p: ReadParams = parse(params)?;
                let state = provider.read_resource(&p.type_name, &p.state, cancel).await?;
                Ok(json!({ "new_state": state }))
            }
            "ImportResourceState" => {
                let p: ImportParams = parse(params)?;
                let imported = provider
                    .import_resource_state(&p.type_name, &p.id, cancel)
                    .await?;
                Ok(json!({ "imported": imported }))
            }
            "ReadDataSource" => {
                let p: DataSourceParams = parse(params)?;
                let state = provider.read_data_source(&p.type_name, &p.config, cancel).await?;
                Ok(json!({ "state": state }))
            }
            other => Err(ErrorBody::protocol(format!("unknown method '{other}'"))),
        }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> std::result::Result<T, ErrorBody> {
    serde_json::from_value(params).map_err(|e| ErrorBody::protocol(format!("invalid params: {e}")))
}

async fn write_responses<W>(writer: W, mut rx: mpsc::UnboundedReceiver<Response>)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_vec(&response) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Cannot encode response");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = writer.write_all(&line).await {
            warn!(error = %e, "Cannot write response");
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "Cannot flush response");
            return;
        }
    }
}
