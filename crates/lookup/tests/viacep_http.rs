//! ViaCEP client against a local HTTP responder.

use canonical::Cep;
use lookup::{LookupError, PostalDirectory, ViaCepClient};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve canned answers keyed by request path until the test ends.
async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = routes
                    .iter()
                    .find(|(route, _, _)| *route == path)
                    .map(|(_, status, body)| (*status, *body))
                    .unwrap_or((404, ""));
                let reason = match status {
                    200 => "OK",
                    404 => "Not Found",
                    _ => "Service Unavailable",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}/ws")
}

fn client(base_url: &str) -> ViaCepClient {
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    ViaCepClient::with_http_client(base_url, http)
}

fn cep(raw: &str) -> Cep {
    Cep::parse(raw).unwrap()
}

#[tokio::test]
async fn found_not_found_and_transient_answers() {
    let base = serve(vec![
        (
            "/ws/01001000/json/",
            200,
            r#"{"cep":"01001-000","logradouro":"Praça da Sé","bairro":"Sé","localidade":"São Paulo","uf":"SP"}"#,
        ),
        ("/ws/99999999/json/", 200, r#"{"erro": true}"#),
        ("/ws/02002000/json/", 503, "try later"),
        ("/ws/03003000/json/", 200, "<html>maintenance</html>"),
    ])
    .await;
    let client = client(&base);

    let address = client.fetch(&cep("01001000")).await.unwrap();
    assert_eq!(address.street.as_deref(), Some("Praça da Sé"));
    assert_eq!(address.region.as_deref(), Some("SP"));

    assert_eq!(
        client.fetch(&cep("99999999")).await,
        Err(LookupError::NotFound(cep("99999999")))
    );
    assert_eq!(
        client.fetch(&cep("88888888")).await,
        Err(LookupError::NotFound(cep("88888888"))),
        "HTTP 404 is a definitive miss"
    );

    match client.fetch(&cep("02002000")).await {
        Err(LookupError::Transient(msg)) => assert!(msg.contains("503"), "{msg}"),
        other => panic!("expected transient error, got {other:?}"),
    }
    assert!(matches!(
        client.fetch(&cep("03003000")).await,
        Err(LookupError::Transient(msg)) if msg.contains("Invalid JSON")
    ));
}

#[tokio::test]
async fn unreachable_directory_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}/ws"))
        .fetch(&cep("01001000"))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}
