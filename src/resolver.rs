//! Multi-candidate instrument resolution

use crate::{BridgeError, CandidateFailure, ContractSpec, Instrument, VenueSession};

/// Qualify `candidates` in order and return the first contract the venue accepts.
///
/// A candidate fails when the venue errors or returns no match. Failures are
/// logged and collected; only when every candidate fails is a
/// [`BridgeError::Resolution`] returned, listing each attempt in order.
/// A dropped session aborts immediately with a connection error.
pub async fn resolve_first<V>(
    venue: &mut V,
    symbol: &str,
    candidates: &[ContractSpec],
) -> Result<Instrument, BridgeError>
where
    V: VenueSession + ?Sized,
{
    let mut attempts = Vec::with_capacity(candidates.len());

    for spec in candidates {
        let reason: Box<str> = match venue.qualify(spec).await {
            Ok(found) => match found.into_iter().next() {
                Some(instrument) => {
                    tracing::info!(
                        symbol = %symbol,
                        candidate = %spec.label(),
                        contract_id = instrument.contract_id,
                        "Instrument qualified"
                    );
                    return Ok(instrument);
                }
                None => "no matching contract".into(),
            },
            Err(err) => {
                let err = BridgeError::from(err);
                if err.is_connection() {
                    return Err(err);
                }
                err.to_string().into()
            }
        };

        tracing::warn!(symbol = %symbol, candidate = %spec.label(), reason = %reason, "Candidate failed");
        attempts.push(CandidateFailure {
            candidate: spec.label().into(),
            reason,
        });
    }

    Err(BridgeError::Resolution {
        symbol: symbol.into(),
        attempts,
    })
}
