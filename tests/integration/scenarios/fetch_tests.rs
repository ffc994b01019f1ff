use crate::infrastructure::{
    assert_no_yale_in_text, attr_values, count_in_text, element_text, first_attr, SubjectTestRun,
};
use anyhow::Result;
use faleproxy::harness::{FetchOutcome, SAMPLE_HTML_WITH_YALE};
use reqwest::StatusCode;
use serde_json::json;
use tracing::info;

/// The fixture page comes back with every text "Yale" turned into "Fale"
#[tokio::test]
async fn test_replaces_yale_with_fale_in_fetched_content() -> Result<()> {
    let run = SubjectTestRun::start().await?;

    let response = run
        .ctx
        .client()
        .expect_transformed(&run.ctx.fixture_url("/"))
        .await?;
    let html = &response.content;
    info!("fetched {} bytes of rewritten content", html.len());

    assert!(response.success);
    assert_eq!(element_text(html, "title").as_deref(), Some("Fale University Test Page"));
    assert_eq!(element_text(html, "h1").as_deref(), Some("Welcome to Fale University"));

    let paragraph = element_text(html, "p").unwrap_or_default();
    assert!(
        paragraph.contains("Fale University is a private"),
        "unexpected paragraph: {}",
        paragraph
    );

    assert_eq!(element_text(html, "a").as_deref(), Some("About Fale"));
    let href = first_attr(html, "a", "href").unwrap_or_default();
    assert!(href.contains("yale.edu"), "href was rewritten: {}", href);

    assert_eq!(response.title, "Fale University Test Page");
    assert_eq!(response.original_url, run.ctx.fixture_url("/"));

    run.teardown().await;
    Ok(())
}

/// Text substitutions are one-for-one and leave no "Yale" behind
#[tokio::test]
async fn test_fale_count_equals_original_yale_count() -> Result<()> {
    let run = SubjectTestRun::start().await?;

    let response = run
        .ctx
        .client()
        .expect_transformed(&run.ctx.fixture_url("/index.html"))
        .await?;

    let yale_before = count_in_text(SAMPLE_HTML_WITH_YALE, "Yale");
    assert!(yale_before > 0);
    assert_no_yale_in_text(&response.content);
    assert_eq!(count_in_text(&response.content, "Fale"), yale_before);

    run.teardown().await;
    Ok(())
}

/// Links pointing at the original domain are returned byte for byte
#[tokio::test]
async fn test_hrefs_are_preserved() -> Result<()> {
    let run = SubjectTestRun::start().await?;

    let response = run
        .ctx
        .client()
        .expect_transformed(&run.ctx.fixture_url("/"))
        .await?;

    let original = attr_values(SAMPLE_HTML_WITH_YALE, "a", "href");
    let returned = attr_values(&response.content, "a", "href");
    assert!(!original.is_empty());
    assert_eq!(original, returned);

    run.teardown().await;
    Ok(())
}

/// Requests without a URL get a structured 400
#[tokio::test]
async fn test_missing_url_is_rejected() -> Result<()> {
    let run = SubjectTestRun::start().await?;
    let client = run.ctx.client();

    for body in [json!({}), json!({ "url": "" }), json!({ "target": "https://yale.edu" })] {
        let error = client.expect_rejected(body, StatusCode::BAD_REQUEST).await?;
        assert_eq!(error, "URL is required");
    }

    run.teardown().await;
    Ok(())
}

/// A malformed URL is a 500, and the subject keeps serving afterwards
#[tokio::test]
async fn test_invalid_url_does_not_crash_subject() -> Result<()> {
    let run = SubjectTestRun::start().await?;
    let client = run.ctx.client();

    let error = client
        .expect_rejected(json!({ "url": "not-a-valid-url" }), StatusCode::INTERNAL_SERVER_ERROR)
        .await?;
    assert!(error.starts_with("Failed to fetch content"), "error: {}", error);

    assert!(client.is_reachable().await, "subject went away after a bad request");
    assert_eq!(client.get("/health").await?, StatusCode::OK);

    // Still able to do real work
    let outcome = client.fetch(&run.ctx.fixture_url("/")).await?;
    assert!(matches!(outcome, FetchOutcome::Transformed(_)));

    let report = run.teardown().await;
    assert!(report.is_clean(), "teardown warnings: {:?}", report.warnings);
    Ok(())
}

/// An origin nobody listens on is reported as a 500
#[tokio::test]
async fn test_unreachable_origin_is_server_error() -> Result<()> {
    let run = SubjectTestRun::start().await?;

    // Bind then drop to get a port that is very likely closed
    let closed_port = std::net::TcpListener::bind("127.0.0.1:0")?.local_addr()?.port();
    let outcome = run
        .ctx
        .client()
        .fetch(&format!("http://127.0.0.1:{}/", closed_port))
        .await?;

    match outcome {
        FetchOutcome::Rejected { status, error } => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(error.starts_with("Failed to fetch content"));
        }
        FetchOutcome::Transformed(_) => panic!("fetch from a closed port succeeded"),
    }

    run.teardown().await;
    Ok(())
}

/// Plain GET probes answer while the subject is up
#[tokio::test]
async fn test_liveness_probes() -> Result<()> {
    let run = SubjectTestRun::start().await?;
    let client = run.ctx.client();

    assert_eq!(client.get("/").await?, StatusCode::OK);
    assert_eq!(client.get("/health").await?, StatusCode::OK);
    assert_eq!(client.get("/does-not-exist").await?, StatusCode::NOT_FOUND);

    run.teardown().await;
    Ok(())
}
