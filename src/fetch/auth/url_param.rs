use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::Url;

/// An [`HttpClient`] wrapper that appends an API key as a URL query parameter.
///
/// Some agencies publish GTFS-RT behind `?api_key=...` style URLs; the
/// parameter name varies by provider.
pub struct UrlParam<C> {
    inner: C,
    param_name: String,
    key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            inner,
            param_name: param_name.into(),
            key: key.into(),
        }
    }

    fn apply(&self, url: &mut Url) {
        url.query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.apply(req.url_mut());
        self.inner.execute(req).await
    }
}
