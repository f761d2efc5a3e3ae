//! 🎬 Whole files, whole pipeline, real HTTP (well, wiremock HTTP).

use std::sync::Arc;
use std::time::Duration;

use rowrelay::common::DestinationKey;
use rowrelay::error::PipelineError;
use rowrelay::pipeline::Pipeline;
use rowrelay::transport::{
    AuthScheme, HttpTransport, HttpTransportConfig, InMemoryTransport, RetryPolicy, Retrying,
};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline_for(server: &MockServer, flush_at: usize) -> anyhow::Result<Pipeline<Retrying<HttpTransport>>> {
    let http = HttpTransport::new(HttpTransportConfig {
        host: server.uri(),
        objects_host: server.uri(),
        write_key: "wk".into(),
        auth_scheme: AuthScheme::Bearer,
        connect_timeout: Duration::from_secs(2),
        timeout: Duration::from_secs(5),
    })?;
    Ok(Pipeline::new(
        Arc::new(Retrying::new(http, RetryPolicy::new(3, Duration::from_millis(1)))),
        flush_at,
    ))
}

#[tokio::test]
async fn the_one_where_track_1_csv_goes_out_as_two_then_one() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/batch"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let csv = b"userId,event,properties.plan,timestamp\n\
                u1,Signed Up,gold,2024-01-01T00:00:00Z\n\
                u2,Signed Up,silver,2024-01-02T00:00:00Z\n\
                u3,Upgraded,gold,2024-01-03T00:00:00Z\n";
    let report = pipeline_for(&server, 2)?
        .relay_bytes("exports/track_1.csv", csv)
        .await?
        .into_result()?;
    assert_eq!(report.batches.iter().map(|b| b.size).collect::<Vec<_>>(), vec![2, 1]);

    let bodies: Vec<Value> = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body))
        .collect::<Result<_, _>>()?;
    let first = &bodies[0]["batch"][0];
    assert_eq!(first["type"], "track");
    assert_eq!(first["user_id"], "u1");
    assert_eq!(first["properties_plan"], "gold");
    assert_eq!(first["timestamp"], "2024-01-01T00:00:00.000Z");
    assert_eq!(bodies[1]["batch"][0]["user_id"], "u3");
    Ok(())
}

#[tokio::test]
async fn the_one_where_a_rejected_file_reports_its_destination() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/set"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    let result = pipeline_for(&server, 100)?
        .relay_bytes("object_accounts.csv", b"id,name\nacct_1,Initech\n")
        .await?
        .into_result();

    match result {
        Err(PipelineError::Delivery(failures)) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].destination, DestinationKey::collection("accounts"));
            assert!(failures[0].error.to_string().contains("401 Unauthorized"));
        }
        other => panic!("💀 expected a delivery failure, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn the_one_where_concurrent_files_share_a_transport_not_a_fate() -> anyhow::Result<()> {
    let transport = Arc::new(InMemoryTransport::new());
    transport
        .fail_destination(
            DestinationKey::fixed("page"),
            rowrelay::error::TransportError::RetriesExhausted {
                attempts: 3,
                last_error: "503".into(),
            },
        )
        .await;
    let pipeline = Pipeline::new(Arc::clone(&transport), 2);

    let (pages, identifies) = tokio::join!(
        pipeline.relay_bytes("page_views.csv", b"name\nHome\nPricing\nDocs\n"),
        pipeline.relay_bytes("identify_users.csv", b"userId,traits.email\nu1,a@x.io\nu2,b@x.io\nu3,c@x.io\n"),
    );

    assert!(matches!(pages?.into_result(), Err(PipelineError::Delivery(ref f)) if f.len() == 2));
    let identifies = identifies?.into_result()?;
    assert_eq!(identifies.batches_delivered(), 2);

    let sent = transport.sent_to(&DestinationKey::fixed("identify")).await;
    let emails: Vec<_> = sent
        .iter()
        .flat_map(|b| b.records.iter())
        .filter_map(|r| r.fields.get("traits_email").cloned())
        .collect();
    assert_eq!(emails.len(), 3);
    Ok(())
}
