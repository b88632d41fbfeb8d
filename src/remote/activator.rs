use crate::actor::context::ActorContext;
use crate::actor::message::Envelope;
use crate::actor::pid::Pid;
use crate::actor::props::Props;
use crate::actor::{Actor, ActorError, SpawnErr};

use std::collections::HashMap;
use std::sync::Arc;

/// Id of the distinguished system actor that hosts remote spawning.
pub const ACTIVATOR_ID: &str = "$activator";

pub const ACTIVATION_REQUEST_TAG: &str = "activation.request";
pub const ACTIVATION_RESPONSE_TAG: &str = "activation.response";

/// Asks a peer to spawn an actor of a registered kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationRequest {
    pub kind: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActivationResponse {
    Spawned(Pid),
    AlreadyExists(Pid),
    UnknownKind(String),
}

/// Resolves activation requests against the kinds this node advertises and
/// replies with the spawned pid.
pub(crate) struct Activator {
    kinds: Arc<HashMap<String, Props>>,
}

impl Activator {
    pub fn new(kinds: Arc<HashMap<String, Props>>) -> Activator {
        Activator { kinds }
    }
}

#[async_trait]
impl Actor for Activator {
    async fn receive(
        &mut self,
        ctx: &mut ActorContext,
        envelope: Envelope,
    ) -> Result<(), ActorError> {
        let Some(request) = envelope.message.downcast_ref::<ActivationRequest>() else {
            trace!(
                message_type = envelope.message.type_name(),
                "activator received unexpected message"
            );
            return Ok(());
        };

        let response = match self.kinds.get(&request.kind) {
            None => {
                warn!(kind = %request.kind, "activation requested for unknown kind");
                ActivationResponse::UnknownKind(request.kind.clone())
            }
            Some(props) => {
                let spawned = match &request.id {
                    Some(id) => ctx.system().spawn_named(props.clone(), id),
                    None => ctx.system().spawn(props.clone()),
                };

                match spawned {
                    Ok(pid) => {
                        info!(kind = %request.kind, pid = %pid, "activated actor");
                        ActivationResponse::Spawned(pid)
                    }
                    Err(SpawnErr::AlreadyExists(pid)) => ActivationResponse::AlreadyExists(pid),
                }
            }
        };

        ctx.respond(response);
        Ok(())
    }
}
