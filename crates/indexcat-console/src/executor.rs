use indexcat_core::builtin::BuiltinTypes;
use indexcat_core::catalog::IndexCatalog;
use indexcat_core::error::Result;
use indexcat_core::report::{
    IndexDescription, IndexOidsRow, RowCounts, describe_index, index_oids, index_rows,
};
use indexcat_core::tree::OrderedMap;
use indexcat_core::types::RelOids;

use crate::commands::Command;

/// Structured result from executing a command.
#[derive(Debug)]
pub enum CommandResult {
    /// Stored descriptors (OIDS).
    Oids(Vec<IndexOidsRow>),
    /// Textual description of one descriptor (DESCRIBE).
    Description(IndexDescription),
    /// Record counts of the catalog tree (ROWS).
    Rows(RowCounts),
}

/// Execute a parsed command against the catalog.
pub fn execute<M: OrderedMap>(catalog: &IndexCatalog<M>, cmd: &Command) -> Result<CommandResult> {
    match cmd {
        Command::Oids => index_oids(catalog).map(CommandResult::Oids),
        Command::Describe {
            datoid,
            reloid,
            relnode,
            kind,
        } => {
            let oids = RelOids::new(*datoid, *reloid, *relnode);
            describe_index(catalog, oids, kind, &BuiltinTypes).map(CommandResult::Description)
        }
        Command::Rows => index_rows(catalog.map()).map(CommandResult::Rows),
    }
}
