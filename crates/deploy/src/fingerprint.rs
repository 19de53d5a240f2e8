use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    action::{Action, ActionKind},
    future::{ActionKey, Arg},
    params::{ResolvedParam, ResolvedParameters},
};

/// The parts of an action that, when changed, make its journal history stale.
///
/// Literal parameter values are substituted into the arguments. Account parameters stay
/// symbolic (only their index counts), so a fingerprint never needs the chain client.
#[derive(Debug, Serialize)]
struct ActionFingerprint<'a> {
    kind: ActionKind,
    after: &'a [ActionKey],
    accounts: BTreeMap<String, usize>,
}

/// Compute the SHA-256 fingerprint of an action definition.
///
/// The fingerprint is deterministic: the same definition and parameter values always
/// produce the same hex-encoded hash.
pub fn fingerprint(action: &Action, params: &ResolvedParameters) -> String {
    let mut accounts = BTreeMap::new();
    let kind = action
        .kind
        .map_args(|arg| substitute(arg, params, &mut accounts));

    let json = serde_json::to_string(&ActionFingerprint {
        kind,
        after: &action.after,
        accounts,
    })
    .expect("ActionFingerprint serialization should never fail");

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

fn substitute(arg: &Arg, params: &ResolvedParameters, accounts: &mut BTreeMap<String, usize>) -> Arg {
    match arg {
        Arg::Parameter(param) => match params.get(param) {
            Some(ResolvedParam::Value(value)) => Arg::Literal(value.clone()),
            Some(ResolvedParam::Account(index)) => {
                accounts.insert(param.to_string(), *index);
                arg.clone()
            }
            None => arg.clone(),
        },
        Arg::Array(items) => Arg::Array(
            items
                .iter()
                .map(|item| substitute(item, params, accounts))
                .collect(),
        ),
        Arg::Literal(_) | Arg::Future(_) => arg.clone(),
    }
}
