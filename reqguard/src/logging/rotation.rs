//! 日付パーティション付きローテーションファイルライター
//!
//! アクティブファイルはサイズまたは経過時間で退避され、
//! `<stem>-<YYYY-MM-DDTHH-MM-SS.mmm>.<ext>` にリネームされる（任意でgzip圧縮）。
//! 退避ファイルは保持数と保持期間で古い順に削除する。

use crate::logging::clock::SharedClock;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 退避ファイル名に埋め込む時刻の書式
const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";
/// `BACKUP_TIME_FORMAT` で整形した文字列の長さ
const BACKUP_TIME_LEN: usize = 23;
const GZIP_SUFFIX: &str = ".gz";

/// ローテーション方針
///
/// 0 / `None` は制限なしを意味する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// アクティブファイルの最大バイト数
    pub max_bytes: u64,
    /// 退避ファイルの最大保持数
    pub max_backups: usize,
    /// アクティブファイル・退避ファイルの最大保持期間
    pub max_age: Option<Duration>,
    /// 退避ファイルをgzip圧縮するか
    pub compress: bool,
}

/// ファイル名の決め方
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNaming {
    /// `<prefix><YYYY-MM-DD><suffix>`
    Daily {
        /// 日付の前に付く文字列
        prefix: String,
        /// 日付の後に付く文字列（拡張子を含む）
        suffix: String,
    },
    /// 日付に依存しない固定名
    Fixed(String),
}

impl FileNaming {
    /// 指定日のファイル名
    pub fn file_name(&self, date: NaiveDate) -> String {
        match self {
            Self::Daily { prefix, suffix } => {
                format!("{}{}{}", prefix, date.format("%Y-%m-%d"), suffix)
            }
            Self::Fixed(name) => name.clone(),
        }
    }
}

/// パーティション日付の更新方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// 書き込みごとに時計から日付を再評価する
    FollowClock,
    /// `swap_partition` が呼ばれるまで日付を固定する
    Pinned,
}

#[derive(Debug)]
struct ActiveFile {
    file: File,
    size: u64,
    opened_at: DateTime<Local>,
}

/// ローテーション付きファイルライター
#[derive(Debug)]
pub struct RotatingFileWriter {
    directory: PathBuf,
    naming: FileNaming,
    policy: RotationPolicy,
    clock: SharedClock,
    mode: PartitionMode,
    partition: NaiveDate,
    active: Option<ActiveFile>,
}

impl RotatingFileWriter {
    /// ライターを作成する（ファイルは最初の書き込みで開く）
    pub fn new(
        directory: impl Into<PathBuf>,
        naming: FileNaming,
        policy: RotationPolicy,
        clock: SharedClock,
        mode: PartitionMode,
    ) -> io::Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        let partition = clock.now().date_naive();
        Ok(Self {
            directory,
            naming,
            policy,
            clock,
            mode,
            partition,
            active: None,
        })
    }

    /// 現在のパーティション日付
    pub fn partition(&self) -> NaiveDate {
        self.partition
    }

    /// 現在の書き込み先パス
    pub fn current_path(&self) -> PathBuf {
        self.directory.join(self.naming.file_name(self.partition))
    }

    /// パーティションを切り替える
    ///
    /// 同じ日付なら何もしない。切り替えた場合は `true`。
    pub fn swap_partition(&mut self, date: NaiveDate) -> io::Result<bool> {
        if date == self.partition {
            return Ok(false);
        }
        if let Some(mut active) = self.active.take() {
            active.file.flush()?;
        }
        self.partition = date;
        Ok(true)
    }

    /// アクティブファイルを退避し、保持方針に従って古い退避ファイルを削除する
    pub fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut active) = self.active.take() {
            active.file.flush()?;
        }

        let path = self.current_path();
        if !path.exists() {
            return Ok(());
        }

        let backup = self.backup_path(&path);
        fs::rename(&path, &backup)?;
        if self.policy.compress {
            compress_file(&backup)?;
        }
        self.prune(&path)
    }

    fn active_file(&mut self) -> io::Result<&mut ActiveFile> {
        let active = match self.active.take() {
            Some(active) => active,
            None => self.open_file()?,
        };
        Ok(self.active.insert(active))
    }

    fn open_file(&self) -> io::Result<ActiveFile> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())?;
        let metadata = file.metadata()?;
        let size = metadata.len();
        let opened_at = if size > 0 {
            metadata
                .created()
                .or_else(|_| metadata.modified())
                .map(DateTime::<Local>::from)
                .unwrap_or_else(|_| self.clock.now())
        } else {
            self.clock.now()
        };
        Ok(ActiveFile {
            file,
            size,
            opened_at,
        })
    }

    fn needs_rotation(&self, incoming: u64) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        if active.size == 0 {
            return false;
        }
        if self.policy.max_bytes > 0 && active.size.saturating_add(incoming) > self.policy.max_bytes
        {
            return true;
        }
        match self.policy.max_age {
            Some(max_age) => (self.clock.now() - active.opened_at)
                .to_std()
                .map(|age| age >= max_age)
                .unwrap_or(false),
            None => false,
        }
    }

    fn backup_path(&self, active: &Path) -> PathBuf {
        let name = file_name_of(active);
        let (stem, ext) = split_name(&name);
        let stamp = self.clock.now().format(BACKUP_TIME_FORMAT).to_string();

        let mut attempt = 0u32;
        loop {
            let base = if attempt == 0 {
                format!("{}-{}", stem, stamp)
            } else {
                format!("{}-{}-{}", stem, stamp, attempt)
            };
            let candidate = if ext.is_empty() {
                base
            } else {
                format!("{}.{}", base, ext)
            };
            let path = self.directory.join(&candidate);
            let compressed = self.directory.join(format!("{}{}", candidate, GZIP_SUFFIX));
            if !path.exists() && !compressed.exists() {
                return path;
            }
            attempt += 1;
        }
    }

    fn prune(&self, active: &Path) -> io::Result<()> {
        let name = file_name_of(active);
        let (stem, ext) = split_name(&name);

        let mut backups: Vec<(NaiveDateTime, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(stamp) = parse_backup_time(file_name, stem, ext) {
                backups.push((stamp, entry.path()));
            }
        }
        backups.sort();

        if let Some(max_age) = self.policy.max_age {
            let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
            let cutoff = self
                .clock
                .now()
                .naive_local()
                .checked_sub_signed(max_age)
                .unwrap_or(NaiveDateTime::MIN);
            let (expired, kept): (Vec<_>, Vec<_>) =
                backups.into_iter().partition(|(stamp, _)| *stamp < cutoff);
            for (_, path) in expired {
                fs::remove_file(path)?;
            }
            backups = kept;
        }

        let max_backups = self.policy.max_backups;
        if max_backups > 0 && backups.len() > max_backups {
            let excess = backups.len() - max_backups;
            for (_, path) in backups.drain(..excess) {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mode == PartitionMode::FollowClock {
            let today = self.clock.now().date_naive();
            self.swap_partition(today)?;
        }

        self.active_file()?;
        if self.needs_rotation(buf.len() as u64) {
            self.rotate()?;
        }

        let active = self.active_file()?;
        active.file.write_all(buf)?;
        active.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.active.as_mut() {
            Some(active) => active.file.flush(),
            None => Ok(()),
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn split_name(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (name, ""),
    }
}

fn parse_backup_time(file_name: &str, stem: &str, ext: &str) -> Option<NaiveDateTime> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix('-')?;
    let rest = rest.strip_suffix(GZIP_SUFFIX).unwrap_or(rest);
    let rest = if ext.is_empty() {
        rest
    } else {
        rest.strip_suffix(ext)?.strip_suffix('.')?
    };
    let stamp = rest.get(..BACKUP_TIME_LEN)?;
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT).ok()
}

fn compress_file(path: &Path) -> io::Result<()> {
    let mut source = File::open(path)?;
    let target_path = PathBuf::from(format!("{}{}", path.display(), GZIP_SUFFIX));
    let target = File::create(&target_path)?;
    let mut encoder = GzEncoder::new(target, Compression::default());
    io::copy(&mut source, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)
}
