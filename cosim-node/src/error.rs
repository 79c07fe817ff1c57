//! Error type for the bridge between the object dictionary and the device script

use std::path::PathBuf;

use cosim_common::{AbortCode, ObjectId, ObjectType};
use snafu::Snafu;

/// Errors raised while servicing script calls or stack events
///
/// Every error is returned to the script call site which triggered it, or to the event loop
/// invocation which delivered the event. None of them are swallowed along the way.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// A read or write used a name which was never registered
    #[snafu(display("No object registered with name '{name}'"))]
    NameNotFound {
        /// The unknown name
        name: String,
    },
    /// Registration was attempted with a type other than the supported integers
    #[snafu(display("Unsupported object type: {object_type}"))]
    UnsupportedObjectType {
        /// Description of the rejected type argument
        object_type: String,
    },
    /// A script value could not be converted to the width/signedness of the target object
    #[snafu(display("Cannot convert {value} to {target}"))]
    TypeConversion {
        /// Description of the rejected value
        value: String,
        /// The type bound to the object being written
        target: ObjectType,
    },
    /// The stack rejected an access to an object
    #[snafu(display("Error accessing object {id}: {abort_code}"))]
    StackAccess {
        /// The object being accessed
        id: ObjectId,
        /// The reason given by the stack
        abort_code: AbortCode,
    },
    /// A script hook or callback raised an error
    #[snafu(display("Script error: {source}"))]
    Script {
        /// The error raised by the interpreter
        source: mlua::Error,
    },
    /// The script file could not be read
    #[snafu(display("Failed to read script {}: {source}", path.display()))]
    ScriptIo {
        /// Path of the script
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },
    /// A native function was called with an out of range argument
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// What was wrong
        message: String,
    },
}

impl From<mlua::Error> for Error {
    fn from(source: mlua::Error) -> Self {
        Error::Script { source }
    }
}

impl From<Error> for mlua::Error {
    fn from(value: Error) -> Self {
        match value {
            // Errors which originated in the interpreter are passed back unchanged, so that a
            // nested error does not get wrapped once per native call it crosses
            Error::Script { source } => source,
            other => mlua::Error::external(other),
        }
    }
}
