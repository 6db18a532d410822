use chrono::Utc;
use tracing::{info, instrument};

use crate::credentials::TokenStore;
use crate::gmail::query::with_days_back;
use crate::gmail::types::MessageFormat;

use super::requests::{MAX_SEARCH_RESULTS, SearchEmails};
use super::result::{EmailSummary, OperationResult, Payload};
use super::{MailOperations, OperationError};

const SUMMARY_HEADERS: [&str; 2] = ["From", "Subject"];

impl<S: TokenStore> MailOperations<S> {
    /// Lists matching messages, then fetches sender and subject for each in
    /// list order.
    #[instrument(skip(self, request), fields(query = %request.query, max_results = request.max_results))]
    pub async fn search(&self, request: SearchEmails) -> Result<OperationResult, OperationError> {
        if !(1..=MAX_SEARCH_RESULTS).contains(&request.max_results) {
            return Err(OperationError::schema(format!(
                "max_results must be between 1 and {MAX_SEARCH_RESULTS}, got {}",
                request.max_results
            )));
        }

        let query = with_days_back(&request.query, request.days_back, Utc::now().date_naive());
        let listed = self
            .gmail
            .list_messages(
                (!query.is_empty()).then_some(query.as_str()),
                None,
                Some(request.max_results),
            )
            .await?;

        if listed.messages.is_empty() {
            info!(%query, status = "no_results", "search matched nothing");
            return Ok(OperationResult::no_results());
        }

        let mut emails = Vec::with_capacity(listed.messages.len());
        for found in listed
            .messages
            .into_iter()
            .take(request.max_results as usize)
        {
            let message = self
                .gmail
                .get_message(&found.id, MessageFormat::Metadata, &SUMMARY_HEADERS)
                .await?;
            emails.push(EmailSummary {
                from: message.header("From").unwrap_or_default().to_string(),
                subject: message.header("Subject").unwrap_or_default().to_string(),
                snippet: message.snippet.clone().unwrap_or_default(),
                thread_id: message.thread_id.or(found.thread_id),
                id: found.id,
            });
        }

        info!(%query, count = emails.len(), status = "success", "search completed");
        Ok(OperationResult::Success(Payload::Emails { emails }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::OperationStatus;
    use crate::operations::test_support::{MESSAGES, operations};
    use chrono::Duration;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn empty_search_returns_no_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MESSAGES))
            .and(query_param("q", "is:inbox"))
            .and(query_param("maxResults", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resultSizeEstimate": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = operations(&server)
            .search(SearchEmails::default())
            .await
            .expect("search");

        assert_eq!(result.status(), OperationStatus::NoResults);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "status": "no_results", "emails": [] })
        );
    }

    #[tokio::test]
    async fn summaries_follow_list_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MESSAGES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [
                    { "id": "b", "threadId": "tb" },
                    { "id": "a", "threadId": "ta" }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        for (id, subject) in [("a", "First"), ("b", "Second")] {
            Mock::given(method("GET"))
                .and(path(format!("{MESSAGES}/{id}")))
                .and(query_param("format", "metadata"))
                .and(query_param("metadataHeaders", "From"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": id,
                    "threadId": format!("t{id}"),
                    "snippet": format!("snippet {id}"),
                    "payload": { "headers": [
                        { "name": "From", "value": "Alice <alice@example.com>" },
                        { "name": "Subject", "value": subject }
                    ]}
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let result = operations(&server)
            .search(SearchEmails {
                query: "from:alice".into(),
                max_results: 10,
                days_back: None,
            })
            .await
            .expect("search");

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["emails"][0]["id"], "b");
        assert_eq!(value["emails"][0]["subject"], "Second");
        assert_eq!(value["emails"][1]["id"], "a");
        assert_eq!(value["emails"][1]["from"], "Alice <alice@example.com>");
        assert_eq!(value["emails"][1]["snippet"], "snippet a");
    }

    #[tokio::test]
    async fn days_back_restricts_query_by_date() {
        let server = MockServer::start().await;
        let cutoff = (Utc::now() - Duration::days(3)).format("%Y/%m/%d");
        Mock::given(method("GET"))
            .and(path(MESSAGES))
            .and(query_param("q", format!("is:unread after:{cutoff}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let result = operations(&server)
            .search(SearchEmails {
                query: "is:unread".into(),
                max_results: 5,
                days_back: Some(3),
            })
            .await
            .expect("search");

        assert_eq!(result.status(), OperationStatus::NoResults);
    }

    #[tokio::test]
    async fn out_of_range_max_results_is_rejected_before_any_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ops = operations(&server);
        for max_results in [0, 501] {
            let err = ops
                .search(SearchEmails {
                    max_results,
                    ..SearchEmails::default()
                })
                .await
                .expect_err("invalid max_results");
            assert!(matches!(err, OperationError::Schema(_)));
        }
    }

    #[tokio::test]
    async fn failed_metadata_fetch_is_a_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MESSAGES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{ "id": "gone" }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{MESSAGES}/gone")))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let err = operations(&server)
            .search(SearchEmails::default())
            .await
            .expect_err("metadata fetch fails");

        assert!(matches!(err, OperationError::Remote { status: 404, .. }));
    }
}
