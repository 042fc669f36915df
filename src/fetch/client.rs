use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes a prepared request. Implemented by the network client and by the
/// auth wrappers, which adjust the request and delegate.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Box<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}

/// Canned responses for tests, with the last request kept for inspection.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    pub struct CannedClient {
        status: u16,
        body: Vec<u8>,
        pub last_request: Mutex<Option<Request>>,
    }

    impl CannedClient {
        pub fn new(status: u16, body: Vec<u8>) -> Self {
            Self {
                status,
                body,
                last_request: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl HttpClient for CannedClient {
        async fn execute(&self, req: Request) -> reqwest::Result<Response> {
            *self.last_request.lock().unwrap() = Some(req);
            let resp = axum::http::Response::builder()
                .status(self.status)
                .body(self.body.clone())
                .unwrap();
            Ok(Response::from(resp))
        }
    }
}
