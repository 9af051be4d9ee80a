//! In-memory endorse/order/commit state shared by every mock service

use crate::error::{NetworkError, Result};
use ledgerbench_crypto::{Identity, Sha3Hash256, Signer};
use ledgerbench_protocol::messages::{
    Block, BlockHeader, BroadcastResponse, Endorsement, Envelope, HeaderType, Proposal,
    ProposalResponse, Response, SeekInfo, SeekPosition, SignedProposal, Status,
};
use ledgerbench_protocol::{envelope_headers, proposal_headers, Message};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Misbehaviour injected into a single mock peer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PeerFault {
    #[default]
    None,
    /// Endorse with effects that differ from every other peer
    Disagree,
    /// Answer every proposal with the given status
    Status(i32),
    /// Fail every call with a transport error
    FailCalls,
    /// Never answer; in-process block subscriptions never yield a block either
    Hang,
    /// Refuse connections
    Down,
}

#[derive(Debug, Clone)]
pub struct MockLedgerConfig {
    pub msp_id: String,
    /// Envelopes per block
    pub block_size: usize,
    /// Pending envelopes are cut into a block after this long
    pub batch_timeout: Duration,
    /// Capacity of the block fan-out channel
    pub block_buffer: usize,
}

impl Default for MockLedgerConfig {
    fn default() -> Self {
        Self {
            msp_id: "MockPeerMSP".to_string(),
            block_size: 10,
            batch_timeout: Duration::from_millis(100),
            block_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub endorsements: u64,
    pub envelopes: u64,
    pub blocks: u64,
    pub transactions: u64,
}

struct ChainState {
    newest: Block,
    pending: Vec<Vec<u8>>,
}

/// Single-channel ledger: endorses proposals, orders envelopes, cuts blocks
pub struct MockLedger {
    config: MockLedgerConfig,
    identity: Identity,
    state: Mutex<ChainState>,
    blocks: broadcast::Sender<Arc<Block>>,
    endorsements: AtomicU64,
    envelopes: AtomicU64,
    blocks_cut: AtomicU64,
    transactions: AtomicU64,
}

impl MockLedger {
    pub fn new(config: MockLedgerConfig) -> Result<Arc<Self>> {
        if config.block_size == 0 {
            return Err(NetworkError::Protocol("block size must be positive".to_string()));
        }

        let identity = Identity::generate(config.msp_id.clone())?;
        let (blocks, _) = broadcast::channel(config.block_buffer.max(1));
        let genesis = Block {
            header: BlockHeader {
                number: 0,
                previous_hash: Vec::new(),
                data_hash: Sha3Hash256::hash(&[]).as_bytes().to_vec(),
            },
            data: Vec::new(),
            metadata: Vec::new(),
        };

        Ok(Arc::new(Self {
            config,
            identity,
            state: Mutex::new(ChainState {
                newest: genesis,
                pending: Vec::new(),
            }),
            blocks,
            endorsements: AtomicU64::new(0),
            envelopes: AtomicU64::new(0),
            blocks_cut: AtomicU64::new(0),
            transactions: AtomicU64::new(0),
        }))
    }

    pub fn config(&self) -> &MockLedgerConfig {
        &self.config
    }

    /// Simulate a proposal and endorse its effects.
    ///
    /// `peer` labels the endorsing peer; a `Disagree` fault mixes it into the
    /// effects so the result differs from every other peer's.
    pub async fn endorse(
        &self,
        peer: &str,
        signed: &SignedProposal,
        fault: &PeerFault,
    ) -> Result<ProposalResponse> {
        match fault {
            PeerFault::Hang => std::future::pending::<()>().await,
            PeerFault::FailCalls | PeerFault::Down => {
                return Err(NetworkError::Transport(format!("peer {} unavailable", peer)))
            }
            PeerFault::Status(status) => {
                return Ok(error_response(*status, "injected failure"));
            }
            PeerFault::Disagree | PeerFault::None => {}
        }

        let proposal = match Proposal::decode(&signed.proposal_bytes)
            .and_then(|p| proposal_headers(&p).map(|_| p))
        {
            Ok(proposal) => proposal,
            Err(e) => {
                debug!("Peer {} rejecting malformed proposal: {}", peer, e);
                return Ok(error_response(500, &e.to_string()));
            }
        };

        let mut effects = Sha3Hash256::hash(&proposal.payload).as_bytes().to_vec();
        if *fault == PeerFault::Disagree {
            effects.extend_from_slice(peer.as_bytes());
        }

        let endorser = self.identity.serialize()?;
        let mut signed_bytes = effects.clone();
        signed_bytes.extend_from_slice(&endorser);
        let signature = self.identity.sign(&signed_bytes)?;

        self.endorsements.fetch_add(1, Ordering::Relaxed);
        Ok(ProposalResponse {
            version: 1,
            response: Response {
                status: 200,
                message: String::new(),
                payload: Vec::new(),
            },
            payload: effects,
            endorsement: Some(Endorsement {
                endorser,
                signature,
            }),
        })
    }

    /// Accept an envelope for ordering; cuts a block once enough are pending
    pub fn order(&self, envelope: &Envelope) -> BroadcastResponse {
        if let Err(e) = envelope_headers(envelope) {
            return BroadcastResponse {
                status: Status::BadRequest,
                info: e.to_string(),
            };
        }

        let raw = match envelope.encode() {
            Ok(raw) => raw,
            Err(e) => {
                return BroadcastResponse {
                    status: Status::InternalServerError,
                    info: e.to_string(),
                }
            }
        };

        self.envelopes.fetch_add(1, Ordering::Relaxed);
        let full = {
            let mut state = self.state.lock();
            state.pending.push(raw);
            state.pending.len() >= self.config.block_size
        };
        if full {
            self.cut_block();
        }

        BroadcastResponse {
            status: Status::Success,
            info: String::new(),
        }
    }

    /// Commit every pending envelope as the next block
    pub fn cut_block(&self) {
        let block = {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return;
            }
            let data = std::mem::take(&mut state.pending);
            let parts: Vec<&[u8]> = data.iter().map(|d| d.as_slice()).collect();
            let previous = &state.newest.header;
            let number = previous.number.to_be_bytes();
            let previous_hash = Sha3Hash256::hash_parts(&[
                &number[..],
                previous.previous_hash.as_slice(),
                previous.data_hash.as_slice(),
            ]);
            let block = Block {
                header: BlockHeader {
                    number: previous.number + 1,
                    previous_hash: previous_hash.as_bytes().to_vec(),
                    data_hash: Sha3Hash256::hash_parts(&parts).as_bytes().to_vec(),
                },
                data,
                metadata: Vec::new(),
            };
            state.newest = block.clone();

            // published under the lock so subscribers never miss or repeat a block
            let _ = self.blocks.send(Arc::new(block.clone()));
            block
        };

        self.blocks_cut.fetch_add(1, Ordering::Relaxed);
        self.transactions
            .fetch_add(block.data.len() as u64, Ordering::Relaxed);
        debug!(
            "Cut block {} with {} envelopes",
            block.header.number,
            block.data.len()
        );
    }

    /// Validate a deliver seek request and start a block subscription.
    ///
    /// Returns the newest committed block followed by a receiver for every
    /// block cut afterwards. Only `Newest` start positions are served.
    pub fn subscribe(&self, seek: &Envelope) -> Result<(Block, broadcast::Receiver<Arc<Block>>)> {
        let (payload, header) = envelope_headers(seek).map_err(|e| NetworkError::Rejected {
            status: Status::BadRequest.code(),
            info: e.to_string(),
        })?;
        if header.header_type != HeaderType::DeliverSeekInfo {
            return Err(NetworkError::Rejected {
                status: Status::BadRequest.code(),
                info: format!("unexpected header type {:?}", header.header_type),
            });
        }
        let seek_info = SeekInfo::decode(&payload.data).map_err(|e| NetworkError::Rejected {
            status: Status::BadRequest.code(),
            info: e.to_string(),
        })?;
        if seek_info.start != SeekPosition::Newest {
            warn!("Unsupported seek start {:?}", seek_info.start);
            return Err(NetworkError::Rejected {
                status: Status::NotFound.code(),
                info: "only the newest block can be sought".to_string(),
            });
        }

        let state = self.state.lock();
        Ok((state.newest.clone(), self.blocks.subscribe()))
    }

    /// Periodically cut partial blocks until `token` is cancelled
    pub fn spawn_batch_timer(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let ledger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ledger.config.batch_timeout);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => ledger.cut_block(),
                }
            }
            info!("Mock ledger batch timer stopped");
        })
    }

    pub fn height(&self) -> u64 {
        self.state.lock().newest.header.number
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            endorsements: self.endorsements.load(Ordering::Relaxed),
            envelopes: self.envelopes.load(Ordering::Relaxed),
            blocks: self.blocks_cut.load(Ordering::Relaxed),
            transactions: self.transactions.load(Ordering::Relaxed),
        }
    }
}

fn error_response(status: i32, message: &str) -> ProposalResponse {
    ProposalResponse {
        version: 1,
        response: Response {
            status,
            message: message.to_string(),
            payload: Vec::new(),
        },
        payload: Vec::new(),
        endorsement: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbench_protocol::{
        assemble_transaction, build_deliver_seek_envelope, build_proposal, sign_proposal,
        ArgTemplate, RandomSource,
    };

    fn ledger(block_size: usize) -> Arc<MockLedger> {
        MockLedger::new(MockLedgerConfig {
            block_size,
            ..Default::default()
        })
        .unwrap()
    }

    fn signed_proposal(client: &Identity, rng: &RandomSource) -> (Proposal, SignedProposal) {
        let args = ArgTemplate::parse_all(&["put", "uuid"]).unwrap();
        let (proposal, _) = build_proposal(client, rng, "mychannel", "basic", "1.0", &args).unwrap();
        let signed = sign_proposal(&proposal, client).unwrap();
        (proposal, signed)
    }

    #[tokio::test]
    async fn test_peers_agree_on_effects() {
        let ledger = ledger(10);
        let client = Identity::generate("Org1MSP").unwrap();
        let rng = RandomSource::seeded(1);
        let (_, signed) = signed_proposal(&client, &rng);

        let a = ledger.endorse("peer0", &signed, &PeerFault::None).await.unwrap();
        let b = ledger.endorse("peer1", &signed, &PeerFault::None).await.unwrap();
        assert!(a.is_success());
        assert_eq!(a.payload, b.payload);
        assert!(a.endorsement.is_some());
    }

    #[tokio::test]
    async fn test_disagreeing_peer_breaks_assembly() {
        let ledger = ledger(10);
        let client = Identity::generate("Org1MSP").unwrap();
        let rng = RandomSource::seeded(2);
        let (proposal, signed) = signed_proposal(&client, &rng);

        let a = ledger.endorse("peer0", &signed, &PeerFault::None).await.unwrap();
        let b = ledger.endorse("peer1", &signed, &PeerFault::Disagree).await.unwrap();
        assert!(assemble_transaction(&proposal, &client, &[a, b]).is_err());
    }

    #[tokio::test]
    async fn test_malformed_proposal_gets_error_status() {
        let ledger = ledger(10);
        let signed = SignedProposal {
            proposal_bytes: vec![1, 2, 3],
            signature: vec![],
        };
        let response = ledger.endorse("peer0", &signed, &PeerFault::None).await.unwrap();
        assert_eq!(response.response.status, 500);
        assert!(response.endorsement.is_none());
    }

    #[tokio::test]
    async fn test_blocks_cut_at_block_size() {
        let ledger = ledger(2);
        let client = Identity::generate("Org1MSP").unwrap();
        let rng = RandomSource::seeded(3);
        let seek = build_deliver_seek_envelope("mychannel", &client, &rng).unwrap();
        let (genesis, mut rx) = ledger.subscribe(&seek).unwrap();
        assert_eq!(genesis.header.number, 0);

        for _ in 0..3 {
            let (proposal, signed) = signed_proposal(&client, &rng);
            let response = ledger.endorse("peer0", &signed, &PeerFault::None).await.unwrap();
            let envelope = assemble_transaction(&proposal, &client, &[response]).unwrap();
            assert_eq!(ledger.order(&envelope).status, Status::Success);
        }

        let block = rx.recv().await.unwrap();
        assert_eq!(block.header.number, 1);
        assert_eq!(block.data.len(), 2);
        assert_eq!(ledger.height(), 1);

        ledger.cut_block();
        let block = rx.recv().await.unwrap();
        assert_eq!(block.header.number, 2);
        assert_eq!(block.data.len(), 1);
        assert_eq!(ledger.stats().transactions, 3);
    }

    #[test]
    fn test_garbage_envelope_rejected() {
        let ledger = ledger(1);
        let response = ledger.order(&Envelope {
            payload: vec![9; 4],
            signature: vec![],
        });
        assert_eq!(response.status, Status::BadRequest);
        assert_eq!(ledger.height(), 0);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(MockLedger::new(MockLedgerConfig {
            block_size: 0,
            ..Default::default()
        })
        .is_err());
    }
}
