//! # ledgerbench Protocol
//!
//! Construction, signing and parsing of the ledger messages a benchmark run
//! exchanges with peers and the ordering service:
//!
//! - chaincode invocation proposals (with per-proposal argument templates)
//! - signed proposals sent for endorsement
//! - transaction envelopes assembled from agreeing endorsements
//! - deliver seek requests used to watch committed blocks

pub mod builder;
pub mod error;
pub mod messages;
pub mod random;
pub mod template;

pub use builder::{
    assemble_transaction, build_deliver_seek_envelope, build_proposal, compute_tx_id,
    count_channel_transactions, create_signed_envelope, envelope_headers, proposal_headers,
    sign_proposal, ProposalHeaders,
};
pub use error::{ProtocolError, Result};
pub use messages::Message;
pub use random::RandomSource;
pub use template::ArgTemplate;
