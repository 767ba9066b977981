// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::chain::{
        Connection, Mechanism, NetworkServiceClient, Request, DEVICE_TOKEN_ID_PARAMETER,
        SERVICE_DOMAIN_LABEL, SRIOV_TOKEN_LABEL,
    };
    use crate::errors::TokenClientError;
    use crate::multitoken::TokenClient;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use config::TokenName;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use token_pool::TokenId;

    fn name(s: &str) -> TokenName {
        s.parse().unwrap()
    }

    fn id(s: &str) -> TokenId {
        TokenId::new(s).unwrap()
    }

    fn tokens(entries: &[(&str, &[&str])]) -> BTreeMap<TokenName, Vec<TokenId>> {
        entries
            .iter()
            .map(|(names, ids)| (name(names), ids.iter().map(|s| id(s)).collect()))
            .collect()
    }

    fn labeled_request(connection_id: &str, token_label: &str) -> Request {
        let mut request = Request {
            connection: Connection {
                id: connection_id.to_string(),
                ..Connection::default()
            },
            mechanism_preferences: vec![Mechanism::default(), Mechanism::default()],
        };
        request
            .connection
            .labels
            .insert(SRIOV_TOKEN_LABEL.to_string(), token_label.to_string());
        request
    }

    /// Echoes the request's connection back and records what it saw.
    #[derive(Default)]
    struct StubDownstream {
        requests: Mutex<Vec<Request>>,
        closes: Mutex<Vec<Connection>>,
        fail_requests: AtomicBool,
    }

    impl StubDownstream {
        fn seen_requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NetworkServiceClient for StubDownstream {
        async fn request(&self, request: Request) -> anyhow::Result<Connection> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_requests.load(Ordering::SeqCst) {
                return Err(anyhow!("downstream failure"));
            }
            Ok(request.connection)
        }

        async fn close(&self, connection: Connection) -> anyhow::Result<()> {
            self.closes.lock().unwrap().push(connection);
            Ok(())
        }
    }

    fn client(
        entries: &[(&str, &[&str])],
    ) -> (TokenClient<Arc<StubDownstream>>, Arc<StubDownstream>) {
        let downstream = Arc::new(StubDownstream::default());
        let client = TokenClient::with_tokens(tokens(entries), Arc::clone(&downstream));
        (client, downstream)
    }

    #[tokio::test]
    async fn unlabeled_requests_pass_through_untouched() {
        let (client, downstream) = client(&[("d1/intel", &["1"])]);
        let request = Request {
            connection: Connection {
                id: "conn-1".to_string(),
                ..Connection::default()
            },
            mechanism_preferences: vec![Mechanism::default()],
        };

        let connection = client.request(request.clone()).await.unwrap();
        assert_eq!(downstream.seen_requests(), vec![request.clone()]);
        assert_eq!(connection, request.connection);
    }

    #[tokio::test]
    async fn labels_and_parameters_are_rewritten_for_downstream() {
        let (client, downstream) = client(&[("d1/intel", &["1"])]);
        client
            .request(labeled_request("conn-1", "d1/intel"))
            .await
            .unwrap();

        let seen = &downstream.seen_requests()[0];
        assert!(!seen.connection.labels.contains_key(SRIOV_TOKEN_LABEL));
        assert_eq!(
            seen.connection.labels.get(SERVICE_DOMAIN_LABEL),
            Some(&"d1".to_string())
        );
        for mechanism in &seen.mechanism_preferences {
            assert_eq!(
                mechanism.parameters.get(DEVICE_TOKEN_ID_PARAMETER),
                Some(&"1".to_string())
            );
        }
    }

    #[tokio::test]
    async fn returned_connection_gets_the_token_label_back() {
        let (client, _) = client(&[("d1/intel", &["1"])]);
        let connection = client
            .request(labeled_request("conn-1", "d1/intel"))
            .await
            .unwrap();

        assert_eq!(
            connection.labels.get(SRIOV_TOKEN_LABEL),
            Some(&"d1/intel".to_string())
        );
        assert!(!connection.labels.contains_key(SERVICE_DOMAIN_LABEL));
    }

    #[tokio::test]
    async fn exhausted_name_short_circuits_with_no_free_token() {
        let (client, downstream) = client(&[("d1/intel", &["1"])]);
        client
            .request(labeled_request("conn-1", "d1/intel"))
            .await
            .unwrap();

        let error = client
            .request(labeled_request("conn-2", "d1/intel"))
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<TokenClientError>(),
            Some(&TokenClientError::NoFreeToken(name("d1/intel")))
        );
        // the failing request never reached downstream
        assert_eq!(downstream.seen_requests().len(), 1);
    }

    #[tokio::test]
    async fn unknown_name_short_circuits_with_no_free_token() {
        let (client, downstream) = client(&[("d1/intel", &["1"])]);
        let error = client
            .request(labeled_request("conn-1", "d9/none"))
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<TokenClientError>(),
            Some(&TokenClientError::NoFreeToken(name("d9/none")))
        );
        assert!(downstream.seen_requests().is_empty());
    }

    #[tokio::test]
    async fn malformed_label_is_an_error_before_downstream() {
        let (client, downstream) = client(&[("d1/intel", &["1"])]);
        assert!(client
            .request(labeled_request("conn-1", "not-a-name"))
            .await
            .is_err());
        assert!(downstream.seen_requests().is_empty());
    }

    #[tokio::test]
    async fn a_connection_keeps_its_token_across_requests() {
        let (client, downstream) = client(&[("d1/intel", &["1", "2"])]);
        let connection = client
            .request(labeled_request("conn-1", "d1/intel"))
            .await
            .unwrap();

        // heal: the returned connection carries the label again
        let request = Request {
            connection,
            mechanism_preferences: vec![Mechanism::default()],
        };
        client.request(request).await.unwrap();

        let seen = downstream.seen_requests();
        let first = seen[0].mechanism_preferences[0]
            .parameters
            .get(DEVICE_TOKEN_ID_PARAMETER);
        let second = seen[1].mechanism_preferences[0]
            .parameters
            .get(DEVICE_TOKEN_ID_PARAMETER);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failed_fresh_request_releases_the_token() {
        let (client, downstream) = client(&[("d1/intel", &["1"])]);
        downstream.fail_requests.store(true, Ordering::SeqCst);
        assert!(client
            .request(labeled_request("conn-1", "d1/intel"))
            .await
            .is_err());

        // the token is free again for another connection
        downstream.fail_requests.store(false, Ordering::SeqCst);
        client
            .request(labeled_request("conn-2", "d1/intel"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_refresh_keeps_an_established_token() {
        let (client, downstream) = client(&[("d1/intel", &["1"])]);
        client
            .request(labeled_request("conn-1", "d1/intel"))
            .await
            .unwrap();

        downstream.fail_requests.store(true, Ordering::SeqCst);
        assert!(client
            .request(labeled_request("conn-1", "d1/intel"))
            .await
            .is_err());

        // conn-1 still holds the token, so conn-2 finds none
        let error = client
            .request(labeled_request("conn-2", "d1/intel"))
            .await
            .unwrap_err();
        assert_eq!(
            error.downcast_ref::<TokenClientError>(),
            Some(&TokenClientError::NoFreeToken(name("d1/intel")))
        );
    }

    #[tokio::test]
    async fn close_releases_the_token_and_forwards() {
        let (client, downstream) = client(&[("d1/intel", &["1"])]);
        let connection = client
            .request(labeled_request("conn-1", "d1/intel"))
            .await
            .unwrap();

        client.close(connection).await.unwrap();
        assert_eq!(downstream.closes.lock().unwrap().len(), 1);

        // released: a new connection can take the token
        client
            .request(labeled_request("conn-2", "d1/intel"))
            .await
            .unwrap();
    }
}
