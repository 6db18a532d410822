use tracing::{info, instrument, warn};

use crate::credentials::TokenStore;
use crate::gmail::mime::{BodyFormat, OutgoingMessage};
use crate::gmail::thread::{THREAD_HEADERS, ThreadContext};
use crate::gmail::types::MessageFormat;

use super::requests::ReplyEmail;
use super::result::{OperationResult, Payload, SentMessage};
use super::send::build_error;
use super::{MailOperations, OperationError, require_message_id};

impl<S: TokenStore> MailOperations<S> {
    /// Replies to the sender of `message_id` inside its thread, then applies
    /// any requested label changes to the reply itself.
    #[instrument(skip(self, request), fields(message_id = %request.message_id))]
    pub async fn reply(&self, request: ReplyEmail) -> Result<OperationResult, OperationError> {
        let message_id = require_message_id(&request.message_id)?;
        let _guard = self.locks.lock(message_id).await;

        let original = self
            .gmail
            .get_message(message_id, MessageFormat::Metadata, &THREAD_HEADERS)
            .await?;
        let context = ThreadContext::from_message(&original)
            .map_err(|err| OperationError::Decode(err.to_string()))?;

        let message = OutgoingMessage {
            to: vec![context.sender.clone()],
            subject: context.reply_subject(),
            body: request.body,
            format: BodyFormat::Plain,
            in_reply_to: context.message_id.clone(),
            references: context.reply_references(),
            ..OutgoingMessage::default()
        };
        let raw = message.to_base64_url().map_err(build_error)?;
        let sent = self
            .gmail
            .send_message(raw, Some(context.thread_id.clone()))
            .await
            .map_err(OperationError::from_send)?;

        let add = label_ids(request.add_label_ids);
        let remove = label_ids(request.remove_label_ids);
        if !add.is_empty() || !remove.is_empty() {
            if let Err(err) = self.gmail.modify_message(&sent.id, add, remove).await {
                warn!(reply_id = %sent.id, error = %err, "reply sent but label update failed");
                return Err(OperationError::ReplyLabels {
                    reply_id: sent.id,
                    source: Box::new(err.into()),
                });
            }
        }

        info!(reply_id = %sent.id, thread_id = %context.thread_id, status = "success", "reply sent");
        Ok(OperationResult::Success(Payload::Sent(SentMessage {
            id: sent.id,
            thread_id: sent.thread_id.or(Some(context.thread_id)),
        })))
    }
}

/// Label ids are case-sensitive for user labels, so only blanks are removed.
fn label_ids(labels: Option<Vec<String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels.into_iter().flatten() {
        let label = label.trim();
        if !label.is_empty() && !out.iter().any(|l| l == label) {
            out.push(label.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::test_support::{MESSAGES, operations};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_original(server: &MockServer, subject: &str) {
        Mock::given(method("GET"))
            .and(path(format!("{MESSAGES}/orig")))
            .and(query_param("format", "metadata"))
            .and(query_param("metadataHeaders", "Message-ID"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "orig",
                "threadId": "thread-1",
                "payload": { "headers": [
                    { "name": "Message-ID", "value": "<orig@mail.example.com>" },
                    { "name": "References", "value": "<root@mail.example.com>" },
                    { "name": "Subject", "value": subject },
                    { "name": "From", "value": "Sam Lee <sam@example.com>" }
                ]}
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn mount_send(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(format!("{MESSAGES}/send")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "reply-1",
                "threadId": "thread-1"
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    async fn sent_document(server: &MockServer) -> (serde_json::Value, String) {
        let requests = server.received_requests().await.expect("recorded");
        let send = requests
            .iter()
            .find(|r| r.url.path().ends_with("/send"))
            .expect("send request");
        let body: serde_json::Value = send.body_json().expect("json");
        let raw = URL_SAFE_NO_PAD
            .decode(body["raw"].as_str().expect("raw"))
            .expect("base64url");
        (body, String::from_utf8(raw).expect("utf8"))
    }

    #[tokio::test]
    async fn reply_threads_and_addresses_sender() {
        let server = MockServer::start().await;
        mount_original(&server, "Quarterly Report").await;
        mount_send(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{MESSAGES}/reply-1/modify")))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = operations(&server)
            .reply(ReplyEmail {
                message_id: "orig".into(),
                body: "Thanks, looks good.".into(),
                add_label_ids: None,
                remove_label_ids: Some(vec![]),
            })
            .await
            .expect("reply");

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "status": "success", "id": "reply-1", "thread_id": "thread-1" })
        );
        let (body, raw) = sent_document(&server).await;
        assert_eq!(body["threadId"], "thread-1");
        assert!(raw.contains("sam@example.com"));
        assert!(raw.contains("Subject: Re: Quarterly Report"));
        assert!(raw.contains("In-Reply-To: <orig@mail.example.com>"));
        assert!(raw.contains("<root@mail.example.com>"));
        assert!(raw.contains("Content-Type: text/plain"));
    }

    #[tokio::test]
    async fn existing_re_prefix_is_kept() {
        let server = MockServer::start().await;
        mount_original(&server, "RE: Quarterly Report").await;
        mount_send(&server).await;

        operations(&server)
            .reply(ReplyEmail {
                message_id: "orig".into(),
                body: "Noted".into(),
                add_label_ids: None,
                remove_label_ids: None,
            })
            .await
            .expect("reply");

        let (_, raw) = sent_document(&server).await;
        assert!(raw.contains("Subject: RE: Quarterly Report"));
        assert!(!raw.contains("Re: RE:"));
    }

    #[tokio::test]
    async fn labels_apply_to_the_reply_not_the_original() {
        let server = MockServer::start().await;
        mount_original(&server, "Hello").await;
        mount_send(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{MESSAGES}/reply-1/modify")))
            .and(body_json(json!({
                "addLabelIds": ["Label_42"],
                "removeLabelIds": []
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "reply-1",
                "labelIds": ["SENT", "Label_42"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = operations(&server)
            .reply(ReplyEmail {
                message_id: "orig".into(),
                body: "Filed".into(),
                add_label_ids: Some(vec![" Label_42 ".into(), "Label_42".into()]),
                remove_label_ids: None,
            })
            .await
            .expect("reply");

        assert_eq!(result.status().as_str(), "success");
    }

    #[tokio::test]
    async fn label_failure_after_send_is_reported_separately() {
        let server = MockServer::start().await;
        mount_original(&server, "Hello").await;
        mount_send(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("{MESSAGES}/reply-1/modify")))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid label: NOPE"))
            .expect(1)
            .mount(&server)
            .await;

        let err = operations(&server)
            .reply(ReplyEmail {
                message_id: "orig".into(),
                body: "Filed".into(),
                add_label_ids: Some(vec!["NOPE".into()]),
                remove_label_ids: None,
            })
            .await
            .expect_err("labels fail");

        match err {
            OperationError::ReplyLabels { reply_id, source } => {
                assert_eq!(reply_id, "reply-1");
                assert!(matches!(*source, OperationError::Remote { status: 400, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_reply_is_a_send_error() {
        let server = MockServer::start().await;
        mount_original(&server, "Hello").await;
        Mock::given(method("POST"))
            .and(path(format!("{MESSAGES}/send")))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad raw"))
            .expect(1)
            .mount(&server)
            .await;

        let err = operations(&server)
            .reply(ReplyEmail {
                message_id: "orig".into(),
                body: "x".into(),
                add_label_ids: Some(vec!["STARRED".into()]),
                remove_label_ids: None,
            })
            .await
            .expect_err("send rejected");

        assert!(matches!(err, OperationError::Send { status: 400, .. }));
    }

    #[tokio::test]
    async fn original_without_sender_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{MESSAGES}/orig")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "orig",
                "threadId": "thread-1",
                "payload": { "headers": [] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = operations(&server)
            .reply(ReplyEmail {
                message_id: "orig".into(),
                body: "x".into(),
                add_label_ids: None,
                remove_label_ids: None,
            })
            .await
            .expect_err("no sender");

        assert!(matches!(err, OperationError::Decode(_)));
    }

    #[test]
    fn label_ids_keep_case() {
        assert_eq!(
            label_ids(Some(vec!["Label_7".into(), " ".into(), "Label_7".into()])),
            vec!["Label_7"]
        );
        assert!(label_ids(None).is_empty());
    }
}
