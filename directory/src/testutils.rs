use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, header};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub path_and_query: String,
    pub authorization: Option<String>,
    pub body: Bytes,
}

/// Loopback HTTP server that records every request and answers with `respond`.
pub struct MockDirectoryServer {
    pub url: Url,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockDirectoryServer {
    pub async fn spawn<F>(respond: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let recorded = requests.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let io = TokioIo::new(stream);
                let recorded = recorded.clone();
                let respond = respond.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let recorded = recorded.clone();
                        let respond = respond.clone();
                        async move {
                            let (parts, body) = req.into_parts();
                            let request = RecordedRequest {
                                method: parts.method,
                                path_and_query: parts
                                    .uri
                                    .path_and_query()
                                    .map(|pq| pq.to_string())
                                    .unwrap_or_default(),
                                authorization: parts
                                    .headers
                                    .get(header::AUTHORIZATION)
                                    .and_then(|v| v.to_str().ok())
                                    .map(String::from),
                                body: body.collect().await.unwrap().to_bytes(),
                            };

                            let (status, body) = respond(&request);
                            recorded.lock().push(request);

                            let mut response = Response::new(Full::new(Bytes::from(body)));
                            *response.status_mut() = status;
                            Ok::<_, Infallible>(response)
                        }
                    });

                    let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockDirectoryServer {
            url: Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap(),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}
