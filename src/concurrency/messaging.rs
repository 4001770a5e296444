//! Pattern-matched message acceptance: block on a task's inbox until a
//! message matching one of a set of (name, payload-shape) candidates
//! arrives (`AcceptMessage`, §4.4).

use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::operation::{Block, Context};
use crate::scope::{ActivatedScope, ScopeDescription};
use crate::value::{RValue, ValueKind};

/// One pattern an `AcceptMessage` will match against an inbound
/// [`crate::concurrency::task::Message`]: a message name, the payload
/// shape it is bound against, and the body to run once matched (§4.4).
pub struct MessageCandidate {
    pub name: Arc<str>,
    pub payload_types: Vec<ValueKind>,
    pub body: Block,
}

impl MessageCandidate {
    /// The body scope's first `payload_types.len()` declared members, in
    /// order: these receive the matched message's payload values (§4.4).
    /// Any further members are the body's own locals and are left `Null`.
    fn body_param_names(&self) -> Vec<Arc<str>> {
        self.body
            .description
            .as_ref()
            .map(|description| {
                description
                    .members
                    .iter()
                    .take(self.payload_types.len())
                    .map(|m| m.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A named, pre-registered group of candidates a task can accept against
/// by name instead of listing them inline (`AcceptMessageFromResponseMap`,
/// §4.4; resolves the §9 open question on where response maps live — see
/// DESIGN.md).
pub struct ResponseMap {
    pub candidates: Vec<MessageCandidate>,
}

/// The program-wide registry from response-map name to [`ResponseMap`]
/// (mirrors [`crate::concurrency::thread_pool::PoolRegistry`]'s shape).
/// `ScopeDescription::response_map_names` records which names a scope
/// declared; this registry is where the declared maps actually live, kept
/// separate so the scope layer never depends on concurrency types
/// directly (see the doc comment on `response_map_names`).
#[derive(Default)]
pub struct ResponseMapRegistry {
    maps: parking_lot::RwLock<hashbrown::HashMap<Arc<str>, Arc<ResponseMap>>>,
}

impl ResponseMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<Arc<str>>, map: ResponseMap) {
        self.maps.write().insert(name.into(), Arc::new(map));
    }

    pub fn get(&self, name: &str) -> Option<Arc<ResponseMap>> {
        self.maps.read().get(name).cloned()
    }
}

fn payload_types_match(payload: &[RValue], expected: &[ValueKind]) -> bool {
    payload.len() == expected.len()
        && payload
            .iter()
            .zip(expected)
            .all(|(value, kind)| &value.kind() == kind)
}

/// Blocks on `ctx.inbox` until a message matches one of `candidates` by
/// name and payload shape, then binds the payload into the matched
/// candidate's body scope (ghosted under the message's declared member
/// names, in order) and runs the body (§4.4).
///
/// Messages that match no candidate are dropped (§4.4: "a message for
/// which no candidate matches is discarded, not requeued").
pub fn accept(ctx: &mut Context, candidates: &[MessageCandidate]) -> VmResult<RValue> {
    loop {
        let message = ctx.inbox.recv().map_err(VmError::from)?;
        let matched = candidates
            .iter()
            .find(|c| *c.name == *message.name && payload_types_match(&message.payload, &c.payload_types));

        let Some(candidate) = matched else {
            log::debug!("dropping message '{}': no candidate matched", message.name);
            continue;
        };

        let description = candidate
            .body
            .description
            .clone()
            .unwrap_or_else(|| Arc::new(ScopeDescription::new(None)));
        let scope = ActivatedScope::enter(
            description,
            Some(ctx.scope.clone()),
            crate::ids::TaskHandle::INVALID,
            &mut ctx.stack,
        );
        for (member, value) in candidate.body_param_names().iter().zip(message.payload.iter()) {
            ActivatedScope::set_variable(&scope, member, value.clone())?;
        }
        ActivatedScope::set_message_origin(&scope, message.sender);

        let previous = ctx.enter_scope(scope);
        let outcome = candidate.body.execute(ctx, false, false, 0);
        let activated = std::mem::replace(&mut ctx.scope, previous);
        outcome?;
        ActivatedScope::exit(&activated, &mut ctx.stack)?;
        return Ok(RValue::Null);
    }
}
