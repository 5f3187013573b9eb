//! Live-API target

use super::{Target, TargetKind};
use crate::context::{Context, Provider};
use crate::error::{Error, Result};
use crate::lifecycle::Action;
use crate::task::{Change, Task};
use crate::value::Fields;
use log::{info, warn};

/// Applies changes immediately through [`Task::apply`]
///
/// Deletes are idempotent for every task type: when the provider answers
/// "not found" to a delete render, the resource is already gone and the
/// render counts as a success.
#[derive(Debug, Default)]
pub struct ApiTarget;

impl ApiTarget {
    pub fn new() -> Self {
        Self
    }
}

impl<C: Provider> Target<C> for ApiTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Api
    }

    fn render(&mut self, ctx: &Context<C>, task: &dyn Task<C>, change: &Change) -> Result<Fields> {
        ctx.check_cancelled()?;
        info!("{} {}", change.action, change.key);

        match task.apply(ctx, change) {
            Ok(produced) => Ok(produced),
            Err(err) if change.action == Action::Delete && ctx.provider().is_not_found(&err) => {
                warn!(
                    "{} was already absent during delete; treating as deleted: {err:#}",
                    change.key
                );
                Ok(Fields::new())
            }
            Err(err) => Err(Error::from_task(err, |source| Error::Render {
                key: change.key.clone(),
                source,
            })),
        }
    }
}
