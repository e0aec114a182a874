//! Snapshot sources
//!
//! A snapshot source returns the current values of a fixed set of gauges and
//! counters from an external system. The scheduler calls it once per cycle.
//! `NodeRestSource` reads a Lightning node's REST API and derives the node
//! summary figures (peers, channels, funds, available liquidity).

use crate::error::Result;
use crate::storage::MetricKind;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// One value reported by a snapshot source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub name: String,
    pub kind: MetricKind,
    pub value: i64,
}

impl Observation {
    pub fn gauge(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Gauge,
            value,
        }
    }

    pub fn counter(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            kind: MetricKind::Counter,
            value,
        }
    }
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current values
    async fn fetch(&self) -> Result<Vec<Observation>>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// `getinfo` fields used by the summary
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub num_peers: i64,
    pub num_pending_channels: i64,
    pub num_active_channels: i64,
    pub num_inactive_channels: i64,
    pub fees_collected_msat: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundsOutput {
    pub amount_msat: i64,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeFunds {
    #[serde(default)]
    pub outputs: Vec<FundsOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PeerChannel {
    pub state: String,
    pub to_us_msat: i64,
    pub total_msat: i64,
    #[serde(default)]
    pub our_reserve_msat: i64,
    #[serde(default)]
    pub their_reserve_msat: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Peer {
    pub connected: bool,
    #[serde(default)]
    pub channels: Vec<PeerChannel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodePeers {
    #[serde(default)]
    pub peers: Vec<Peer>,
}

const CHANNEL_NORMAL: &str = "CHANNELD_NORMAL";

/// Derive the node gauges from raw `getinfo`, `listfunds` and `listpeers` results
///
/// Only `CHANNELD_NORMAL` channels count. Spendable liquidity excludes the
/// channel reserve on each side and never goes negative.
pub fn summarize(info: &NodeInfo, funds: &NodeFunds, peers: &NodePeers) -> Vec<Observation> {
    let utxos: Vec<i64> = funds
        .outputs
        .iter()
        .filter(|output| output.status == "confirmed")
        .map(|output| output.amount_msat)
        .collect();

    let mut avail_out: i64 = 0;
    let mut avail_in: i64 = 0;
    let mut num_channels = 0;
    let mut num_connected = 0;
    let mut num_gossipers = 0;

    for peer in &peers.peers {
        let mut active_channel = false;

        for channel in peer.channels.iter().filter(|c| c.state == CHANNEL_NORMAL) {
            num_channels += 1;
            active_channel = true;
            if peer.connected {
                num_connected += 1;
            }

            avail_out += (channel.to_us_msat - channel.our_reserve_msat).max(0);

            let to_them = channel.total_msat - channel.to_us_msat;
            avail_in += (to_them - channel.their_reserve_msat).max(0);
        }

        if !active_channel && peer.connected {
            num_gossipers += 1;
        }
    }

    vec![
        Observation::gauge("getinfo_num_peers", info.num_peers),
        Observation::gauge("getinfo_num_pending_channels", info.num_pending_channels),
        Observation::gauge("getinfo_num_active_channels", info.num_active_channels),
        Observation::gauge("getinfo_num_inactive_channels", info.num_inactive_channels),
        Observation::gauge("getinfo_fees_collected_msat", info.fees_collected_msat),
        Observation::gauge("summary_num_utxos", utxos.len() as i64),
        Observation::gauge("summary_utxo_amount", utxos.iter().sum()),
        Observation::gauge("summary_num_channels", num_channels),
        Observation::gauge("summary_num_connected", num_connected),
        Observation::gauge("summary_num_gossipers", num_gossipers),
        Observation::gauge("summary_avail_total", avail_out + avail_in),
        Observation::gauge("summary_avail_out", avail_out),
        Observation::gauge("summary_avail_in", avail_in),
    ]
}

/// Node REST API client
pub struct NodeRestSource {
    client: reqwest::Client,
    base_url: String,
    rune: Option<String>,
}

impl NodeRestSource {
    pub fn new(base_url: &str, rune: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rune,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str) -> Result<T> {
        let url = format!("{}/v1/{}", self.base_url, method);

        let mut request = self.client.post(&url).json(&serde_json::json!({}));
        if let Some(rune) = &self.rune {
            request = request.header("Rune", rune);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SnapshotSource for NodeRestSource {
    async fn fetch(&self) -> Result<Vec<Observation>> {
        let (info, funds, peers) = tokio::try_join!(
            self.call::<NodeInfo>("getinfo"),
            self.call::<NodeFunds>("listfunds"),
            self.call::<NodePeers>("listpeers"),
        )?;

        Ok(summarize(&info, &funds, &peers))
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}

/// Source with no snapshot values; cycles then flush recorded events only
pub struct EventsOnlySource;

#[async_trait]
impl SnapshotSource for EventsOnlySource {
    async fn fetch(&self) -> Result<Vec<Observation>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "events-only"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn value_of(observations: &[Observation], name: &str) -> i64 {
        observations
            .iter()
            .find(|o| o.name == name)
            .unwrap_or_else(|| panic!("missing {}", name))
            .value
    }

    fn sample_info() -> NodeInfo {
        NodeInfo {
            num_peers: 3,
            num_pending_channels: 1,
            num_active_channels: 2,
            num_inactive_channels: 0,
            fees_collected_msat: 1234,
        }
    }

    fn sample_funds() -> NodeFunds {
        serde_json::from_value(json!({
            "outputs": [
                {"amount_msat": 100_000, "status": "confirmed"},
                {"amount_msat": 50_000, "status": "unconfirmed"},
                {"amount_msat": 25_000, "status": "confirmed"}
            ]
        }))
        .unwrap()
    }

    fn sample_peers() -> NodePeers {
        serde_json::from_value(json!({
            "peers": [
                {
                    "connected": true,
                    "channels": [{
                        "state": "CHANNELD_NORMAL",
                        "to_us_msat": 700_000,
                        "total_msat": 1_000_000,
                        "our_reserve_msat": 10_000,
                        "their_reserve_msat": 10_000
                    }]
                },
                {
                    "connected": false,
                    "channels": [{
                        "state": "CHANNELD_NORMAL",
                        "to_us_msat": 5_000,
                        "total_msat": 500_000,
                        "our_reserve_msat": 10_000,
                        "their_reserve_msat": 5_000
                    }]
                },
                {
                    "connected": true,
                    "channels": [{
                        "state": "ONCHAIN",
                        "to_us_msat": 1,
                        "total_msat": 1
                    }]
                },
                {"connected": true}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_summarize() {
        let observations = summarize(&sample_info(), &sample_funds(), &sample_peers());

        assert_eq!(observations.len(), 13);
        assert!(observations.iter().all(|o| o.kind == MetricKind::Gauge));

        assert_eq!(value_of(&observations, "getinfo_num_peers"), 3);
        assert_eq!(value_of(&observations, "getinfo_fees_collected_msat"), 1234);
        assert_eq!(value_of(&observations, "summary_num_utxos"), 2);
        assert_eq!(value_of(&observations, "summary_utxo_amount"), 125_000);
        assert_eq!(value_of(&observations, "summary_num_channels"), 2);
        assert_eq!(value_of(&observations, "summary_num_connected"), 1);
        assert_eq!(value_of(&observations, "summary_num_gossipers"), 2);

        // 690_000 from the first channel, reserve exceeds balance on the second
        assert_eq!(value_of(&observations, "summary_avail_out"), 690_000);
        // 290_000 + 490_000
        assert_eq!(value_of(&observations, "summary_avail_in"), 780_000);
        assert_eq!(value_of(&observations, "summary_avail_total"), 1_470_000);
    }

    #[test]
    fn test_summarize_empty_node() {
        let observations = summarize(
            &NodeInfo {
                num_peers: 0,
                num_pending_channels: 0,
                num_active_channels: 0,
                num_inactive_channels: 0,
                fees_collected_msat: 0,
            },
            &NodeFunds { outputs: vec![] },
            &NodePeers { peers: vec![] },
        );
        assert!(observations.iter().all(|o| o.value == 0));
    }

    #[tokio::test]
    async fn test_node_rest_source_fetch() {
        let server = MockServer::start_async().await;

        let getinfo = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/getinfo").header("Rune", "test-rune");
                then.status(200).json_body(json!({
                    "num_peers": 3,
                    "num_pending_channels": 1,
                    "num_active_channels": 2,
                    "num_inactive_channels": 0,
                    "fees_collected_msat": 1234,
                    "alias": "ignored"
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/listfunds");
                then.status(200).json_body(json!({
                    "outputs": [{"amount_msat": 100_000, "status": "confirmed"}],
                    "channels": []
                }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/listpeers");
                then.status(200).json_body(json!({"peers": []}));
            })
            .await;

        let source = NodeRestSource::new(
            &server.base_url(),
            Some("test-rune".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        let observations = source.fetch().await.unwrap();
        getinfo.assert_async().await;

        assert_eq!(value_of(&observations, "getinfo_num_peers"), 3);
        assert_eq!(value_of(&observations, "summary_utxo_amount"), 100_000);
    }

    #[tokio::test]
    async fn test_node_rest_source_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(500);
            })
            .await;

        let source = NodeRestSource::new(&server.base_url(), None, Duration::from_secs(5)).unwrap();
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, crate::error::StatsError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_events_only_source_is_empty() {
        let observations = EventsOnlySource.fetch().await.unwrap();
        assert!(observations.is_empty());
    }
}
