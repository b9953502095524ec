mod add;
mod entries;
mod goal;
mod helpers;
mod summary;

pub(crate) use add::{cmd_add, cmd_scan};
pub(crate) use entries::{cmd_delete, cmd_today};
pub(crate) use goal::{cmd_goal_reset, cmd_goal_set, cmd_goal_show};
pub(crate) use summary::cmd_summary;
