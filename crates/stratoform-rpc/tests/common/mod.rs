//! Shared helpers for RPC server tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use stratoform_provider::{
    Attribute, CallContext, Provider, Resource, ResourceData, Result, Schema,
};
use stratoform_rpc::{Response, Server, bind};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::task::JoinHandle;

pub const WIDGET: &str = "test_widget";

/// A resource whose create sleeps for `create_delay` on the call's cancel
/// token, so tests can hold a request in flight.
pub struct Widget {
    pub create_delay: Duration,
}

#[async_trait]
impl Resource for Widget {
    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("name", Attribute::string().required().force_new())
            .attribute("status", Attribute::string().computed())
    }

    async fn create(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        ctx.cancel().sleep(self.create_delay).await?;
        d.set_id(d.get_str("name").to_string());
        self.read(ctx, d).await
    }

    async fn read(&self, _ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        d.set("status", "ready")
    }

    async fn delete(&self, _ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        d.clear_id();
        Ok(())
    }
}

pub struct Client {
    pub lines: Lines<BufReader<OwnedReadHalf>>,
    pub writer: OwnedWriteHalf,
    pub server: JoinHandle<stratoform_rpc::Result<()>>,
}

impl Client {
    pub async fn send(&mut self, id: u64, method: &str, params: Value) {
        let request = json!({"id": id, "method": method, "params": params});
        let mut line = serde_json::to_vec(&request).unwrap();
        line.push(b'\n');
        self.writer.write_all(&line).await.unwrap();
    }

    pub async fn recv(&mut self) -> Response {
        let line = tokio::time::timeout(Duration::from_secs(10), self.lines.next_line())
            .await
            .expect("response timed out")
            .unwrap()
            .expect("server closed the connection");
        serde_json::from_str(&line).unwrap()
    }

    pub async fn call(&mut self, id: u64, method: &str, params: Value) -> Response {
        self.send(id, method, params).await;
        self.recv().await
    }
}

/// Starts a server for a provider with one slow widget resource and
/// connects to it.
pub async fn start(create_delay: Duration) -> Client {
    let provider = Provider::empty(false).with_resource(WIDGET, Widget { create_delay });
    let server = Server::new(provider);
    let listener = bind(None).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(listener).await })
    };

    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, writer) = stream.into_split();
    Client {
        lines: BufReader::new(reader).lines(),
        writer,
        server: handle,
    }
}

pub fn create_params(name: &str) -> Value {
    json!({
        "type_name": WIDGET,
        "prior_state": null,
        "planned_state": {"name": name},
    })
}
