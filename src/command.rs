//! Classification of decoded control messages into requests.

use crate::messages::ControlMessage;

pub const LIST: &str = "-l";
pub const LIST_ALL: &str = "-la";
pub const TRANSFER: &str = "-g";
pub const CHANGE_DIRECTORY: &str = "-c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
	List,
	ListAll,
	Transfer,
	ChangeDirectory,
	Unknown,
}

impl Command {
	pub fn parse(token: &str) -> Command {
		match token {
			LIST => Command::List,
			LIST_ALL => Command::ListAll,
			TRANSFER => Command::Transfer,
			CHANGE_DIRECTORY => Command::ChangeDirectory,
			_ => Command::Unknown,
		}
	}

	/// Wire token, `None` for [`Command::Unknown`].
	pub fn token(self) -> Option<&'static str> {
		match self {
			Command::List => Some(LIST),
			Command::ListAll => Some(LIST_ALL),
			Command::Transfer => Some(TRANSFER),
			Command::ChangeDirectory => Some(CHANGE_DIRECTORY),
			Command::Unknown => None,
		}
	}

	/// Results of this command travel on the data channel.
	pub fn uses_data_channel(self) -> bool {
		matches!(self, Command::List | Command::ListAll | Command::Transfer)
	}
}

/// What the server has to do for one control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
	List { show_hidden: bool },
	Transfer { file_name: Option<&'a [u8]> },
	ChangeDirectory { path: Option<&'a [u8]> },
	Invalid,
}

impl<'a> Request<'a> {
	pub fn dispatch(message: &ControlMessage<'a>) -> Request<'a> {
		match Command::parse(message.command) {
			Command::List => Request::List { show_hidden: false },
			Command::ListAll => Request::List { show_hidden: true },
			Command::Transfer => Request::Transfer { file_name: message.argument },
			Command::ChangeDirectory => Request::ChangeDirectory { path: message.argument },
			Command::Unknown => Request::Invalid,
		}
	}
}
