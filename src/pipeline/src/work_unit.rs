use ledgerbench_protocol::messages::{Envelope, Proposal, ProposalResponse, SignedProposal};

/// One transaction moving through the pipeline.
///
/// Fields fill in stage by stage: signed by the signer, responses collected
/// (in endorser order) by the proposer pool, envelope set by the integrator.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    /// Generation index
    pub seq: u64,
    pub tx_id: String,
    pub proposal: Proposal,
    pub signed_proposal: Option<SignedProposal>,
    pub responses: Vec<ProposalResponse>,
    pub envelope: Option<Envelope>,
}

impl WorkUnit {
    pub fn new(seq: u64, tx_id: String, proposal: Proposal) -> Self {
        Self {
            seq,
            tx_id,
            proposal,
            signed_proposal: None,
            responses: Vec::new(),
            envelope: None,
        }
    }
}
