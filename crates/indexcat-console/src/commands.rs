use clap::Subcommand;
use indexcat_core::types::Oid;

/// A reporting command run against the loaded catalog.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every stored index descriptor with the table it belongs to.
    Oids,
    /// Print the column table and key fields of one descriptor.
    Describe {
        datoid: Oid,
        reloid: Oid,
        relnode: Oid,
        /// One of `toast`, `primary`, `unique`, `regular`.
        kind: String,
    },
    /// Count the records of the catalog tree, live and dead.
    Rows,
}
