use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] presence_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] presence_store_lmdb::LmdbError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("RPC server error: {0}")]
    Rpc(#[from] presence_rpc::RpcError),

    #[error("WebSocket server error: {0}")]
    WebSocket(#[from] presence_websocket::WsError),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
