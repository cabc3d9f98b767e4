/// Liveness probe.
pub async fn root() -> &'static str {
    "success true"
}

pub async fn server() -> &'static str {
    "server true"
}
