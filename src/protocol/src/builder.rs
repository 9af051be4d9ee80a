//! Proposal, transaction and seek message construction

use crate::error::{ProtocolError, Result};
use crate::messages::*;
use crate::random::RandomSource;
use crate::template::ArgTemplate;
use ledgerbench_crypto::{Sha3Hash256, Signer};
use std::collections::BTreeMap;

/// Decoded headers of a proposal
#[derive(Debug, Clone)]
pub struct ProposalHeaders {
    pub header: Header,
    pub channel_header: ChannelHeader,
    pub signature_header: SignatureHeader,
}

/// Transaction id: hex SHA3-256 over nonce then creator
pub fn compute_tx_id(nonce: &[u8], creator: &[u8]) -> String {
    Sha3Hash256::hash_parts(&[nonce, creator]).to_hex()
}

/// Build an unsigned chaincode invocation proposal.
///
/// Returns the proposal together with its transaction id.
pub fn build_proposal(
    signer: &dyn Signer,
    rng: &RandomSource,
    channel: &str,
    chaincode: &str,
    version: &str,
    args: &[ArgTemplate],
) -> Result<(Proposal, String)> {
    let chaincode_id = ChaincodeId {
        name: chaincode.to_string(),
        version: version.to_string(),
    };

    let invocation = ChaincodeInvocationSpec {
        chaincode_spec: ChaincodeSpec {
            chaincode_type: ChaincodeType::Golang,
            chaincode_id: chaincode_id.clone(),
            input: ChaincodeInput {
                args: args.iter().map(|a| a.expand(rng).into_bytes()).collect(),
            },
        },
    }
    .encode()?;

    let creator = signer
        .serialize()
        .map_err(|e| ProtocolError::Encoding(e.to_string()))?;
    let nonce = rng.nonce();
    let tx_id = compute_tx_id(&nonce, &creator);

    let channel_header = ChannelHeader {
        header_type: HeaderType::EndorserTransaction,
        version: 0,
        timestamp: Timestamp::now(),
        channel_id: channel.to_string(),
        tx_id: tx_id.clone(),
        epoch: 0,
        extension: ChaincodeHeaderExtension { chaincode_id }.encode()?,
    };

    let header = Header {
        channel_header: channel_header.encode()?,
        signature_header: SignatureHeader { creator, nonce }.encode()?,
    };

    let payload = ChaincodeProposalPayload {
        input: invocation,
        transient_map: BTreeMap::new(),
    };

    let proposal = Proposal {
        header: header.encode()?,
        payload: payload.encode()?,
    };

    Ok((proposal, tx_id))
}

/// Serialize and sign a proposal
pub fn sign_proposal(proposal: &Proposal, signer: &dyn Signer) -> Result<SignedProposal> {
    let proposal_bytes = proposal.encode()?;
    let signature = signer
        .sign(&proposal_bytes)
        .map_err(|e| ProtocolError::Signing(e.to_string()))?;

    Ok(SignedProposal {
        proposal_bytes,
        signature,
    })
}

/// Decode the header chain of a proposal
pub fn proposal_headers(proposal: &Proposal) -> Result<ProposalHeaders> {
    let header = Header::decode(&proposal.header).map_err(malformed("Header"))?;
    let channel_header =
        ChannelHeader::decode(&header.channel_header).map_err(malformed("ChannelHeader"))?;
    let signature_header =
        SignatureHeader::decode(&header.signature_header).map_err(malformed("SignatureHeader"))?;

    Ok(ProposalHeaders {
        header,
        channel_header,
        signature_header,
    })
}

/// Assemble endorsed responses into a signed transaction envelope.
///
/// All responses must be successful and carry byte-identical effects.
pub fn assemble_transaction(
    proposal: &Proposal,
    signer: &dyn Signer,
    responses: &[ProposalResponse],
) -> Result<Envelope> {
    if responses.is_empty() {
        return Err(ProtocolError::NoResponses);
    }

    let headers = proposal_headers(proposal)?;
    let proposal_payload = ChaincodeProposalPayload::decode(&proposal.payload)
        .map_err(malformed("ChaincodeProposalPayload"))?;

    let signer_bytes = signer
        .serialize()
        .map_err(|e| ProtocolError::Encoding(e.to_string()))?;
    if signer_bytes != headers.signature_header.creator {
        return Err(ProtocolError::IdentityMismatch);
    }

    ChaincodeHeaderExtension::decode(&headers.channel_header.extension)
        .map_err(malformed("ChaincodeHeaderExtension"))?;

    let reference = &responses[0].payload;
    let mut endorsements = Vec::with_capacity(responses.len());
    for (index, response) in responses.iter().enumerate() {
        if !response.is_success() {
            return Err(ProtocolError::EndorsementMismatch {
                index,
                status: response.response.status,
                message: response.response.message.clone(),
            });
        }
        if &response.payload != reference {
            return Err(ProtocolError::EndorsementDisagreement { index });
        }
        let endorsement = response.endorsement.clone().ok_or_else(|| {
            ProtocolError::EndorsementMismatch {
                index,
                status: response.response.status,
                message: "missing endorsement".to_string(),
            }
        })?;
        endorsements.push(endorsement);
    }

    // transient data is for endorsers only and never reaches the orderer
    let payload_for_tx = ChaincodeProposalPayload {
        input: proposal_payload.input,
        transient_map: BTreeMap::new(),
    }
    .encode()?;

    let action_payload = ChaincodeActionPayload {
        chaincode_proposal_payload: payload_for_tx,
        action: ChaincodeEndorsedAction {
            proposal_response_payload: reference.clone(),
            endorsements,
        },
    }
    .encode()?;

    let transaction = Transaction {
        actions: vec![TransactionAction {
            header: headers.header.signature_header.clone(),
            payload: action_payload,
        }],
    }
    .encode()?;

    let payload = Payload {
        header: headers.header,
        data: transaction,
    }
    .encode()?;

    let signature = signer
        .sign(&payload)
        .map_err(|e| ProtocolError::Signing(e.to_string()))?;

    Ok(Envelope { payload, signature })
}

/// Signed request to stream blocks from the newest one onwards, forever
pub fn build_deliver_seek_envelope(
    channel: &str,
    signer: &dyn Signer,
    rng: &RandomSource,
) -> Result<Envelope> {
    let seek_info = SeekInfo {
        start: SeekPosition::Newest,
        stop: SeekPosition::Specified(u64::MAX),
        behavior: SeekBehavior::BlockUntilReady,
    };

    create_signed_envelope(
        HeaderType::DeliverSeekInfo,
        channel,
        signer,
        rng,
        seek_info.encode()?,
    )
}

/// Wrap arbitrary data in a signed envelope for the given channel
pub fn create_signed_envelope(
    header_type: HeaderType,
    channel: &str,
    signer: &dyn Signer,
    rng: &RandomSource,
    data: Vec<u8>,
) -> Result<Envelope> {
    let creator = signer
        .serialize()
        .map_err(|e| ProtocolError::Encoding(e.to_string()))?;

    let channel_header = ChannelHeader {
        header_type,
        version: 0,
        timestamp: Timestamp::now(),
        channel_id: channel.to_string(),
        tx_id: String::new(),
        epoch: 0,
        extension: Vec::new(),
    };

    let payload = Payload {
        header: Header {
            channel_header: channel_header.encode()?,
            signature_header: SignatureHeader {
                creator,
                nonce: rng.nonce(),
            }
            .encode()?,
        },
        data,
    }
    .encode()?;

    let signature = signer
        .sign(&payload)
        .map_err(|e| ProtocolError::Signing(e.to_string()))?;

    Ok(Envelope { payload, signature })
}

/// Decode the payload and channel header of an envelope
pub fn envelope_headers(envelope: &Envelope) -> Result<(Payload, ChannelHeader)> {
    let payload = Payload::decode(&envelope.payload)?;
    let channel_header = ChannelHeader::decode(&payload.header.channel_header)?;
    Ok((payload, channel_header))
}

/// Number of endorser transactions in a block that belong to `channel`.
///
/// Entries that do not decode are not counted.
pub fn count_channel_transactions(block: &Block, channel: &str) -> usize {
    block
        .data
        .iter()
        .filter_map(|raw| Envelope::decode(raw).ok())
        .filter_map(|env| envelope_headers(&env).ok())
        .filter(|(_, header)| {
            header.header_type == HeaderType::EndorserTransaction && header.channel_id == channel
        })
        .count()
}

fn malformed(what: &'static str) -> impl Fn(ProtocolError) -> ProtocolError {
    move |e| ProtocolError::MalformedProposal(format!("error unmarshaling {}: {}", what, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbench_crypto::{verify, Identity};

    fn response(status: i32, payload: &[u8]) -> ProposalResponse {
        ProposalResponse {
            version: 1,
            response: Response {
                status,
                message: String::new(),
                payload: vec![],
            },
            payload: payload.to_vec(),
            endorsement: Some(Endorsement {
                endorser: b"peer".to_vec(),
                signature: b"sig".to_vec(),
            }),
        }
    }

    fn proposal_for(identity: &Identity) -> Proposal {
        let rng = RandomSource::seeded(9);
        let args = ArgTemplate::parse_all(&["invoke", "a", "b", "1"]).unwrap();
        build_proposal(identity, &rng, "mychannel", "mycc", "1.0", &args)
            .unwrap()
            .0
    }

    #[test]
    fn test_build_proposal_headers() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let rng = RandomSource::seeded(1);
        let args = ArgTemplate::parse_all(&["invoke", "uuid"]).unwrap();
        let (proposal, tx_id) =
            build_proposal(&identity, &rng, "mychannel", "mycc", "1.0", &args).unwrap();

        let headers = proposal_headers(&proposal).unwrap();
        assert_eq!(headers.channel_header.channel_id, "mychannel");
        assert_eq!(headers.channel_header.tx_id, tx_id);
        assert_eq!(headers.channel_header.header_type, HeaderType::EndorserTransaction);
        assert_eq!(headers.signature_header.creator, identity.serialize().unwrap());
        assert_eq!(
            tx_id,
            compute_tx_id(&headers.signature_header.nonce, &headers.signature_header.creator)
        );

        let ext = ChaincodeHeaderExtension::decode(&headers.channel_header.extension).unwrap();
        assert_eq!(ext.chaincode_id.name, "mycc");
        assert_eq!(ext.chaincode_id.version, "1.0");
    }

    #[test]
    fn test_literal_args_are_encoded_verbatim() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let proposal = proposal_for(&identity);

        let payload = ChaincodeProposalPayload::decode(&proposal.payload).unwrap();
        let spec = ChaincodeInvocationSpec::decode(&payload.input).unwrap();
        let args: Vec<&[u8]> = spec
            .chaincode_spec
            .input
            .args
            .iter()
            .map(|a| a.as_slice())
            .collect();
        assert_eq!(args, vec![&b"invoke"[..], &b"a"[..], &b"b"[..], &b"1"[..]]);
    }

    #[test]
    fn test_sign_proposal_verifies() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let proposal = proposal_for(&identity);
        let signed = sign_proposal(&proposal, &identity).unwrap();

        assert_eq!(Proposal::decode(&signed.proposal_bytes).unwrap(), proposal);
        assert!(verify(&identity.public_key_bytes(), &signed.proposal_bytes, &signed.signature).unwrap());
    }

    #[test]
    fn test_assemble_matching_responses() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let proposal = proposal_for(&identity);
        let responses = vec![response(200, b"P"), response(200, b"P")];

        let envelope = assemble_transaction(&proposal, &identity, &responses).unwrap();
        assert!(verify(&identity.public_key_bytes(), &envelope.payload, &envelope.signature).unwrap());

        let (payload, channel_header) = envelope_headers(&envelope).unwrap();
        assert_eq!(channel_header.channel_id, "mychannel");

        let tx = Transaction::decode(&payload.data).unwrap();
        assert_eq!(tx.actions.len(), 1);
        let action = ChaincodeActionPayload::decode(&tx.actions[0].payload).unwrap();
        assert_eq!(action.action.proposal_response_payload, b"P");
        assert_eq!(action.action.endorsements.len(), 2);
    }

    #[test]
    fn test_assemble_rejects_disagreement() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let proposal = proposal_for(&identity);
        let responses = vec![response(200, b"P"), response(200, b"Q")];

        assert!(matches!(
            assemble_transaction(&proposal, &identity, &responses),
            Err(ProtocolError::EndorsementDisagreement { index: 1 })
        ));
    }

    #[test]
    fn test_assemble_rejects_failed_status() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let proposal = proposal_for(&identity);

        assert!(matches!(
            assemble_transaction(&proposal, &identity, &[response(500, b"P")]),
            Err(ProtocolError::EndorsementMismatch { index: 0, status: 500, .. })
        ));
        assert!(matches!(
            assemble_transaction(&proposal, &identity, &[response(200, b"P"), response(404, b"P")]),
            Err(ProtocolError::EndorsementMismatch { index: 1, status: 404, .. })
        ));
    }

    #[test]
    fn test_assemble_rejects_empty() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let proposal = proposal_for(&identity);
        assert!(matches!(
            assemble_transaction(&proposal, &identity, &[]),
            Err(ProtocolError::NoResponses)
        ));
    }

    #[test]
    fn test_assemble_rejects_foreign_identity() {
        let creator = Identity::generate("Org1MSP").unwrap();
        let other = Identity::generate("Org1MSP").unwrap();
        let proposal = proposal_for(&creator);

        assert!(matches!(
            assemble_transaction(&proposal, &other, &[response(200, b"P")]),
            Err(ProtocolError::IdentityMismatch)
        ));
    }

    #[test]
    fn test_assemble_rejects_malformed_proposal() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let proposal = Proposal {
            header: vec![0xff; 3],
            payload: vec![],
        };
        assert!(matches!(
            assemble_transaction(&proposal, &identity, &[response(200, b"P")]),
            Err(ProtocolError::MalformedProposal(_))
        ));
    }

    #[test]
    fn test_deliver_seek_envelope() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let rng = RandomSource::seeded(5);
        let envelope = build_deliver_seek_envelope("mychannel", &identity, &rng).unwrap();

        let (payload, channel_header) = envelope_headers(&envelope).unwrap();
        assert_eq!(channel_header.header_type, HeaderType::DeliverSeekInfo);
        assert_eq!(channel_header.channel_id, "mychannel");

        let seek = SeekInfo::decode(&payload.data).unwrap();
        assert_eq!(seek.start, SeekPosition::Newest);
        assert_eq!(seek.stop, SeekPosition::Specified(u64::MAX));
        assert_eq!(seek.behavior, SeekBehavior::BlockUntilReady);
    }

    #[test]
    fn test_count_channel_transactions() {
        let identity = Identity::generate("Org1MSP").unwrap();
        let rng = RandomSource::seeded(5);
        let ours = assemble_transaction(&proposal_for(&identity), &identity, &[response(200, b"P")])
            .unwrap()
            .encode()
            .unwrap();
        let seek = build_deliver_seek_envelope("mychannel", &identity, &rng)
            .unwrap()
            .encode()
            .unwrap();

        let block = Block {
            header: BlockHeader {
                number: 3,
                previous_hash: vec![],
                data_hash: vec![],
            },
            data: vec![ours.clone(), ours, seek, vec![1, 2, 3]],
            metadata: vec![],
        };

        assert_eq!(count_channel_transactions(&block, "mychannel"), 2);
        assert_eq!(count_channel_transactions(&block, "otherchannel"), 0);
    }
}
