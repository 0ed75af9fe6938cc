use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use super::NinepError;
use super::fcall::{Fcall, IOHDRSZ, Msg, NOFID, NOTAG, Qid, VERSION};

const DEFAULT_MSIZE: u32 = 8192 + IOHDRSZ;
const ROOT_FID: u32 = 0;

trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send> Transport for T {}

struct Conn {
    stream: Box<dyn Transport>,
    next_tag: u16,
}

/// A 9P connection attached to a file server's root.
///
/// Requests are serialized: each RPC holds the connection for the
/// request and its reply. Callers that block on a read (the acme log)
/// should use a dedicated client.
pub struct Client {
    conn: Mutex<Conn>,
    msize: u32,
    next_fid: AtomicU32,
}

impl Client {
    /// Dial a posted service socket and attach as the current user.
    pub fn dial(path: &Path) -> Result<Arc<Self>, NinepError> {
        debug!("Dialing 9P service at {:?}", path);
        let stream = UnixStream::connect(path)?;
        Self::handshake(stream, &super::username())
    }

    /// Negotiate the protocol version and attach over an open stream.
    pub fn handshake<S>(stream: S, uname: &str) -> Result<Arc<Self>, NinepError>
    where
        S: Read + Write + Send + 'static,
    {
        let mut conn = Conn {
            stream: Box::new(stream),
            next_tag: 0,
        };
        let reply = exchange(
            &mut conn,
            NOTAG,
            Fcall::Tversion {
                msize: DEFAULT_MSIZE,
                version: VERSION.to_string(),
            },
            DEFAULT_MSIZE,
        )?;
        let msize = match reply {
            Fcall::Rversion { msize, version } => {
                if version != VERSION {
                    return Err(NinepError::Version(version));
                }
                if msize <= IOHDRSZ {
                    return Err(NinepError::Malformed(format!(
                        "msize {msize} leaves no room for data"
                    )));
                }
                msize.min(DEFAULT_MSIZE)
            }
            other => {
                return Err(NinepError::Unexpected {
                    expected: "Rversion",
                    got: other.name(),
                });
            }
        };

        let client = Self {
            conn: Mutex::new(conn),
            msize,
            next_fid: AtomicU32::new(ROOT_FID + 1),
        };
        match client.rpc(Fcall::Tattach {
            fid: ROOT_FID,
            afid: NOFID,
            uname: uname.to_string(),
            aname: String::new(),
        })? {
            Fcall::Rattach { .. } => {}
            other => {
                return Err(NinepError::Unexpected {
                    expected: "Rattach",
                    got: other.name(),
                });
            }
        }
        debug!("9P session attached (msize {})", msize);
        Ok(Arc::new(client))
    }

    /// Negotiated maximum message size.
    pub fn msize(&self) -> u32 {
        self.msize
    }

    fn rpc(&self, body: Fcall) -> Result<Fcall, NinepError> {
        let mut conn = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let tag = conn.next_tag;
        conn.next_tag = if tag >= NOTAG - 1 { 0 } else { tag + 1 };
        match exchange(&mut conn, tag, body, self.msize)? {
            Fcall::Rerror { ename } => Err(NinepError::Remote(ename)),
            reply => Ok(reply),
        }
    }

    /// Walk from the root to `path` and open it with `mode`.
    pub fn open(self: &Arc<Self>, path: &str, mode: u8) -> Result<Fid, NinepError> {
        let wnames: Vec<String> = path
            .split('/')
            .filter(|elem| !elem.is_empty())
            .map(str::to_string)
            .collect();
        let fid = self.next_fid.fetch_add(1, Ordering::Relaxed);
        let wanted = wnames.len();

        match self.rpc(Fcall::Twalk {
            fid: ROOT_FID,
            newfid: fid,
            wnames,
        })? {
            Fcall::Rwalk { qids } if qids.len() == wanted => {}
            Fcall::Rwalk { .. } => return Err(NinepError::NotFound(path.to_string())),
            other => {
                return Err(NinepError::Unexpected {
                    expected: "Rwalk",
                    got: other.name(),
                });
            }
        }

        // From here on the fid exists on the server; dropping it clunks.
        let mut handle = Fid {
            client: Arc::clone(self),
            fid,
            iounit: 0,
            offset: 0,
            qid: Qid::default(),
        };
        match self.rpc(Fcall::Topen { fid, mode })? {
            Fcall::Ropen { qid, iounit } => {
                handle.qid = qid;
                handle.iounit = iounit;
            }
            other => {
                return Err(NinepError::Unexpected {
                    expected: "Ropen",
                    got: other.name(),
                });
            }
        }
        trace!("Opened {} as fid {}", path, fid);
        Ok(handle)
    }
}

fn exchange(conn: &mut Conn, tag: u16, body: Fcall, msize: u32) -> Result<Fcall, NinepError> {
    let request = Msg::new(tag, body);
    conn.stream.write_all(&request.encode())?;
    conn.stream.flush()?;
    let reply = Msg::read_from(&mut conn.stream, msize)?;
    if reply.tag != tag {
        return Err(NinepError::TagMismatch {
            sent: tag,
            got: reply.tag,
        });
    }
    Ok(reply.body)
}

/// An open file on a 9P server. Clunked on drop.
pub struct Fid {
    client: Arc<Client>,
    fid: u32,
    iounit: u32,
    offset: u64,
    qid: Qid,
}

impl Fid {
    pub fn qid(&self) -> Qid {
        self.qid
    }

    fn max_io(&self) -> u32 {
        let limit = self.client.msize - IOHDRSZ;
        if self.iounit == 0 {
            limit
        } else {
            self.iounit.min(limit)
        }
    }

    /// Read at an explicit offset without moving the file position.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, NinepError> {
        let count = (buf.len() as u32).min(self.max_io());
        match self.client.rpc(Fcall::Tread {
            fid: self.fid,
            offset,
            count,
        })? {
            Fcall::Rread { data } => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            other => Err(NinepError::Unexpected {
                expected: "Rread",
                got: other.name(),
            }),
        }
    }

    /// Write `data`, split into iounit-sized messages.
    ///
    /// acme treats every Twrite as a unit (one ctl command batch, one
    /// event), so small writes go out in a single message.
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), NinepError> {
        let chunk = self.max_io() as usize;
        let mut rest = data;
        loop {
            let (now, later) = rest.split_at(rest.len().min(chunk));
            let written = match self.client.rpc(Fcall::Twrite {
                fid: self.fid,
                offset: self.offset,
                data: now.to_vec(),
            })? {
                Fcall::Rwrite { count } => count as usize,
                other => {
                    return Err(NinepError::Unexpected {
                        expected: "Rwrite",
                        got: other.name(),
                    });
                }
            };
            if written != now.len() {
                return Err(NinepError::Remote(format!(
                    "short write: {written} of {} bytes",
                    now.len()
                )));
            }
            self.offset += written as u64;
            rest = later;
            if rest.is_empty() {
                return Ok(());
            }
        }
    }

    /// Release the fid on the server.
    pub fn clunk(mut self) -> Result<(), NinepError> {
        let fid = std::mem::replace(&mut self.fid, NOFID);
        self.client.rpc(Fcall::Tclunk { fid }).map(|_| ())
    }
}

impl Read for Fid {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self
            .read_at(buf, self.offset)
            .map_err(std::io::Error::other)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl Write for Fid {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_data(buf).map_err(std::io::Error::other)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for Fid {
    fn drop(&mut self) {
        if self.fid != NOFID {
            let _ = self.client.rpc(Fcall::Tclunk { fid: self.fid });
        }
    }
}
