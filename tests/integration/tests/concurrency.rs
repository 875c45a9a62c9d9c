//! Concurrent use of one pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use saml_sp::{PipelineOutcome, ValidationRule};

use crate::common::*;

#[test]
fn same_response_authenticates_once() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate::default().build(fixture.idp_key())?;

    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| fixture.post(&xml, None)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    let mut authenticated = 0;
    for outcome in outcomes {
        match outcome {
            PipelineOutcome::Authenticated(_) => authenticated += 1,
            PipelineOutcome::Rejected(rejection) => assert_eq!(
                rejection.error.validation_rule(),
                Some(ValidationRule::InResponseTo)
            ),
            PipelineOutcome::NotApplicable => anyhow::bail!("request was not matched"),
        }
    }
    assert_eq!(authenticated, 1);
    Ok(())
}

#[test]
fn parallel_logins_share_the_parser_pool() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let responses = (0..16)
        .map(|i| {
            let request_id = format!("req-{i}");
            fixture.issue_request_id(&request_id);
            ResponseTemplate {
                in_response_to: Some(request_id),
                name_id: format!("user-{i}"),
                ..ResponseTemplate::default()
            }
            .build(fixture.idp_key())
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let succeeded = AtomicUsize::new(0);
    thread::scope(|scope| {
        for (i, xml) in responses.iter().enumerate() {
            let fixture = &fixture;
            let succeeded = &succeeded;
            scope.spawn(move || {
                let outcome = fixture.post(xml, None).expect("request builds");
                let authentication = authenticated(outcome).expect("login succeeds");
                assert_eq!(authentication.principal_name(), Some(format!("user-{i}").as_str()));
                succeeded.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    assert_eq!(succeeded.load(Ordering::SeqCst), responses.len());
    Ok(())
}
