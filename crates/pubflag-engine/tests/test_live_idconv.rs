//! Test identifier resolution against the real NCBI ID converter.
//!
//! Run with: cargo test --package pubflag-engine --test test_live_idconv -- --ignored --nocapture

use pubflag_common::ResolutionConfig;
use pubflag_engine::{IdConverter, IdKind, NcbiIdConverter};

#[tokio::test]
#[ignore] // Requires network access
async fn test_idconv_pmid_lookup() {
    let converter = NcbiIdConverter::new(&ResolutionConfig::default()).expect("client build failed");

    let records = converter
        .convert(IdKind::Pmid, &["33383772".to_string(), "23193287".to_string()])
        .await
        .expect("idconv lookup failed");

    for record in &records {
        println!("\n---");
        println!("PMID: {:?}", record.pmid);
        println!("PMCID: {:?}", record.pmcid);
        println!("DOI: {:?}", record.doi);
    }

    assert!(!records.is_empty(), "Should get at least one record");
}

#[tokio::test]
#[ignore] // Requires network access
async fn test_idconv_unknown_identifier_is_not_fatal() {
    let converter = NcbiIdConverter::new(&ResolutionConfig::default()).expect("client build failed");

    let records = converter
        .convert(IdKind::Pmcid, &["PMC999999999".to_string()])
        .await
        .expect("idconv lookup failed");

    assert!(records.iter().all(|r| r.doi.is_none()));
}
