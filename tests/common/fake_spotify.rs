//! In-process stand-in for the Spotify Web API.

use playlist_etl::spotify::{HttpResponse, HttpTransport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const TOKEN_CALL: &str = "TOKEN";

/// Serves a fixed response per URL. Scripted one-off responses queued with
/// [`FakeSpotify::fail_next`] are served first.
pub struct FakeSpotify {
    token_response: Mutex<HttpResponse>,
    routes: Mutex<HashMap<String, HttpResponse>>,
    scripted: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSpotify {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            token_response: Mutex::new(HttpResponse::ok(
                r#"{"access_token":"test-token","token_type":"Bearer","expires_in":3600}"#,
            )),
            routes: Mutex::new(HashMap::new()),
            scripted: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn route(&self, url: impl Into<String>, response: HttpResponse) {
        self.routes.lock().unwrap().insert(url.into(), response);
    }

    pub fn reject_token(&self, status: u16) {
        *self.token_response.lock().unwrap() =
            HttpResponse::with_status(status, r#"{"error":"invalid_client"}"#);
    }

    /// Answer the next `times` requests to `url` with `status`.
    pub fn fail_next(&self, url: &str, status: u16, times: usize) {
        let mut scripted = self.scripted.lock().unwrap();
        let queue = scripted.entry(url.to_string()).or_default();
        for _ in 0..times {
            queue.push_back(HttpResponse::with_status(status, "{}"));
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    pub fn transport(self: &Arc<Self>) -> Box<dyn HttpTransport> {
        Box::new(FakeTransport(Arc::clone(self)))
    }
}

struct FakeTransport(Arc<FakeSpotify>);

impl HttpTransport for FakeTransport {
    fn get(&self, url: &str, bearer_token: &str) -> Result<HttpResponse, TransportError> {
        let fake = &self.0;
        fake.calls.lock().unwrap().push(url.to_string());

        if bearer_token != "test-token" {
            return Ok(HttpResponse::with_status(401, "{}"));
        }
        if let Some(response) = fake
            .scripted
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return Ok(response);
        }
        Ok(fake
            .routes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| HttpResponse::with_status(404, r#"{"error":"not found"}"#)))
    }

    fn post_form(
        &self,
        _url: &str,
        _basic_credentials: &str,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let fake = &self.0;
        fake.calls.lock().unwrap().push(TOKEN_CALL.to_string());
        assert!(form.contains(&("grant_type", "client_credentials")));
        Ok(fake.token_response.lock().unwrap().clone())
    }
}
