use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use log::{info, warn};
use thiserror::Error;

use crate::rules::RuleSet;
use crate::session::{DerivationSession, SessionId, SessionSettings, SessionSnapshot, SnapshotError};

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("unknown session {0}")]
	UnknownSession(SessionId),
	#[error("session lock is poisoned")]
	Poisoned,
	#[error("can't read or write sessions: {0}")]
	Io(#[from] std::io::Error),
	#[error("can't serialize sessions: {0}")]
	Serialization(#[from] serde_json::Error),
	#[error("session {id}: {source}")]
	Snapshot {
		id: SessionId,
		source: SnapshotError,
	},
}

/// Сессии по идентификатору. У каждой сессии свой замок, так что разные сессии не мешают друг другу.
#[derive(Default)]
pub struct SessionStore {
	sessions: RwLock<HashMap<SessionId, Arc<Mutex<DerivationSession>>>>,
}

impl SessionStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, session: DerivationSession) -> Result<SessionId, StoreError> {
		let id = session.id();
		self.sessions
			.write()
			.map_err(|_| StoreError::Poisoned)?
			.insert(id, Arc::new(Mutex::new(session)));
		Ok(id)
	}

	pub fn get(&self, id: SessionId) -> Result<Arc<Mutex<DerivationSession>>, StoreError> {
		self.sessions
			.read()
			.map_err(|_| StoreError::Poisoned)?
			.get(&id)
			.cloned()
			.ok_or(StoreError::UnknownSession(id))
	}

	/// Выполняет `f` под замком сессии.
	pub fn with_session<T, F>(&self, id: SessionId, f: F) -> Result<T, StoreError>
	where
		F: FnOnce(&mut DerivationSession) -> T,
	{
		let session = self.get(id)?;
		let mut guard = session.lock().map_err(|_| StoreError::Poisoned)?;
		Ok(f(&mut *guard))
	}

	pub fn remove(&self, id: SessionId) -> Result<(), StoreError> {
		self.sessions
			.write()
			.map_err(|_| StoreError::Poisoned)?
			.remove(&id)
			.map(|_| ())
			.ok_or(StoreError::UnknownSession(id))
	}

	pub fn len(&self) -> usize {
		self.sessions.read().map(|sessions| sessions.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn snapshots(&self) -> Result<Vec<SessionSnapshot>, StoreError> {
		let sessions = self.sessions.read().map_err(|_| StoreError::Poisoned)?;
		let mut result = Vec::with_capacity(sessions.len());
		for session in sessions.values() {
			result.push(session.lock().map_err(|_| StoreError::Poisoned)?.snapshot());
		}
		result.sort_by_key(|snapshot| snapshot.created_at);
		Ok(result)
	}

	/// Записывает все сессии как JSON-массив снимков.
	pub fn save_to_writer<W: Write>(&self, mut writer: W) -> Result<(), StoreError> {
		serde_json::to_writer_pretty(&mut writer, &self.snapshots()?)?;
		writer.flush()?;
		Ok(())
	}

	/// Загружает снимки, заменяя сессии с теми же идентификаторами. Возвращает число загруженных сессий.
	pub fn load_from_reader<R: Read>(&self, reader: R, rules: &Arc<RuleSet>, settings: SessionSettings) -> Result<usize, StoreError> {
		let snapshots: Vec<SessionSnapshot> = serde_json::from_reader(reader)?;
		let mut restored = Vec::with_capacity(snapshots.len());
		for snapshot in snapshots {
			let id = snapshot.id;
			let session = DerivationSession::restore(snapshot, Arc::clone(rules), settings)
				.map_err(|source| {
					warn!("session {} can't be restored: {}", id, source);
					StoreError::Snapshot { id, source }
				})?;
			restored.push(session);
		}

		let count = restored.len();
		for session in restored {
			self.insert(session)?;
		}
		Ok(count)
	}

	/// Пишет во временный файл рядом и переименовывает его, так что при ошибке старый файл остаётся целым.
	pub fn save(&self, path: &Path) -> Result<(), StoreError> {
		let snapshots = self.snapshots()?;
		let bytes = serde_json::to_vec_pretty(&snapshots)?;

		let temporary = temporary_path(path);
		let written = write_file(&temporary, &bytes).and_then(|()| fs::rename(&temporary, path));
		if let Err(err) = written {
			warn!("can't save sessions to {}: {}", path.display(), err);
			let _ = fs::remove_file(&temporary);
			return Err(err.into());
		}
		info!("saved {} sessions to {}", snapshots.len(), path.display());
		Ok(())
	}

	pub fn load(&self, path: &Path, rules: &Arc<RuleSet>, settings: SessionSettings) -> Result<usize, StoreError> {
		let count = self.load_from_reader(BufReader::new(File::open(path)?), rules, settings)?;
		info!("loaded {} sessions from {}", count, path.display());
		Ok(count)
	}
}

fn temporary_path(path: &Path) -> PathBuf {
	let mut name = path.file_name().map(OsString::from).unwrap_or_else(|| OsString::from("sessions"));
	name.push(".tmp");
	path.with_file_name(name)
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
	let mut writer = BufWriter::new(File::create(path)?);
	writer.write_all(bytes)?;
	writer.into_inner().map_err(|err| err.into_error())?.sync_all()
}
