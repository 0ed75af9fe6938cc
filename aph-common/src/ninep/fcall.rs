//! 9P2000 message encoding.
//!
//! Only the subset of the protocol acme's file server needs is implemented:
//! version, attach, walk, open, read, write and clunk. Every message is
//! `size[4] type[1] tag[2] body`, little-endian, with strings as `len[2]`
//! followed by UTF-8 bytes.

use std::io::Read;

use super::NinepError;

pub const NOTAG: u16 = 0xFFFF;
pub const NOFID: u32 = 0xFFFF_FFFF;
/// Header overhead of Tread/Twrite/Rread, subtracted from msize for payloads.
pub const IOHDRSZ: u32 = 24;
pub const VERSION: &str = "9P2000";

pub const OREAD: u8 = 0;
pub const OWRITE: u8 = 1;
pub const ORDWR: u8 = 2;

const TVERSION: u8 = 100;
const RVERSION: u8 = 101;
const TATTACH: u8 = 104;
const RATTACH: u8 = 105;
const RERROR: u8 = 107;
const TWALK: u8 = 110;
const RWALK: u8 = 111;
const TOPEN: u8 = 112;
const ROPEN: u8 = 113;
const TREAD: u8 = 116;
const RREAD: u8 = 117;
const TWRITE: u8 = 118;
const RWRITE: u8 = 119;
const TCLUNK: u8 = 120;
const RCLUNK: u8 = 121;

/// Largest message we accept from the server before version negotiation.
const MAX_MSG: u32 = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qid {
    pub ty: u8,
    pub version: u32,
    pub path: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fcall {
    Tversion {
        msize: u32,
        version: String,
    },
    Rversion {
        msize: u32,
        version: String,
    },
    Tattach {
        fid: u32,
        afid: u32,
        uname: String,
        aname: String,
    },
    Rattach { qid: Qid },
    Rerror { ename: String },
    Twalk {
        fid: u32,
        newfid: u32,
        wnames: Vec<String>,
    },
    Rwalk { qids: Vec<Qid> },
    Topen {
        fid: u32,
        mode: u8,
    },
    Ropen {
        qid: Qid,
        iounit: u32,
    },
    Tread {
        fid: u32,
        offset: u64,
        count: u32,
    },
    Rread { data: Vec<u8> },
    Twrite {
        fid: u32,
        offset: u64,
        data: Vec<u8>,
    },
    Rwrite { count: u32 },
    Tclunk { fid: u32 },
    Rclunk,
}

impl Fcall {
    fn type_byte(&self) -> u8 {
        match self {
            Self::Tversion { .. } => TVERSION,
            Self::Rversion { .. } => RVERSION,
            Self::Tattach { .. } => TATTACH,
            Self::Rattach { .. } => RATTACH,
            Self::Rerror { .. } => RERROR,
            Self::Twalk { .. } => TWALK,
            Self::Rwalk { .. } => RWALK,
            Self::Topen { .. } => TOPEN,
            Self::Ropen { .. } => ROPEN,
            Self::Tread { .. } => TREAD,
            Self::Rread { .. } => RREAD,
            Self::Twrite { .. } => TWRITE,
            Self::Rwrite { .. } => RWRITE,
            Self::Tclunk { .. } => TCLUNK,
            Self::Rclunk => RCLUNK,
        }
    }

    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tversion { .. } => "Tversion",
            Self::Rversion { .. } => "Rversion",
            Self::Tattach { .. } => "Tattach",
            Self::Rattach { .. } => "Rattach",
            Self::Rerror { .. } => "Rerror",
            Self::Twalk { .. } => "Twalk",
            Self::Rwalk { .. } => "Rwalk",
            Self::Topen { .. } => "Topen",
            Self::Ropen { .. } => "Ropen",
            Self::Tread { .. } => "Tread",
            Self::Rread { .. } => "Rread",
            Self::Twrite { .. } => "Twrite",
            Self::Rwrite { .. } => "Rwrite",
            Self::Tclunk { .. } => "Tclunk",
            Self::Rclunk => "Rclunk",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Msg {
    pub tag: u16,
    pub body: Fcall,
}

impl Msg {
    pub fn new(tag: u16, body: Fcall) -> Self {
        Self { tag, body }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Encoder::default();
        out.u32(0);
        out.u8(self.body.type_byte());
        out.u16(self.tag);
        match &self.body {
            Fcall::Tversion { msize, version } | Fcall::Rversion { msize, version } => {
                out.u32(*msize);
                out.string(version);
            }
            Fcall::Tattach {
                fid,
                afid,
                uname,
                aname,
            } => {
                out.u32(*fid);
                out.u32(*afid);
                out.string(uname);
                out.string(aname);
            }
            Fcall::Rattach { qid } => out.qid(qid),
            Fcall::Rerror { ename } => out.string(ename),
            Fcall::Twalk {
                fid,
                newfid,
                wnames,
            } => {
                out.u32(*fid);
                out.u32(*newfid);
                out.u16(wnames.len() as u16);
                for name in wnames {
                    out.string(name);
                }
            }
            Fcall::Rwalk { qids } => {
                out.u16(qids.len() as u16);
                for qid in qids {
                    out.qid(qid);
                }
            }
            Fcall::Topen { fid, mode } => {
                out.u32(*fid);
                out.u8(*mode);
            }
            Fcall::Ropen { qid, iounit } => {
                out.qid(qid);
                out.u32(*iounit);
            }
            Fcall::Tread { fid, offset, count } => {
                out.u32(*fid);
                out.u64(*offset);
                out.u32(*count);
            }
            Fcall::Rread { data } => {
                out.u32(data.len() as u32);
                out.bytes(data);
            }
            Fcall::Twrite { fid, offset, data } => {
                out.u32(*fid);
                out.u64(*offset);
                out.u32(data.len() as u32);
                out.bytes(data);
            }
            Fcall::Rwrite { count } => out.u32(*count),
            Fcall::Tclunk { fid } => out.u32(*fid),
            Fcall::Rclunk => {}
        }
        let mut buf = out.0;
        let size = buf.len() as u32;
        buf[..4].copy_from_slice(&size.to_le_bytes());
        buf
    }

    /// Decode one complete message, including its size prefix.
    pub fn decode(buf: &[u8]) -> Result<Self, NinepError> {
        let mut d = Decoder { buf, pos: 0 };
        let size = d.u32()? as usize;
        if size != buf.len() {
            return Err(NinepError::Malformed(format!(
                "size field {size} does not match {} bytes",
                buf.len()
            )));
        }
        let ty = d.u8()?;
        let tag = d.u16()?;
        let body = match ty {
            TVERSION => Fcall::Tversion {
                msize: d.u32()?,
                version: d.string()?,
            },
            RVERSION => Fcall::Rversion {
                msize: d.u32()?,
                version: d.string()?,
            },
            TATTACH => Fcall::Tattach {
                fid: d.u32()?,
                afid: d.u32()?,
                uname: d.string()?,
                aname: d.string()?,
            },
            RATTACH => Fcall::Rattach { qid: d.qid()? },
            RERROR => Fcall::Rerror { ename: d.string()? },
            TWALK => {
                let fid = d.u32()?;
                let newfid = d.u32()?;
                let n = d.u16()?;
                let wnames = (0..n).map(|_| d.string()).collect::<Result<_, _>>()?;
                Fcall::Twalk {
                    fid,
                    newfid,
                    wnames,
                }
            }
            RWALK => {
                let n = d.u16()?;
                let qids = (0..n).map(|_| d.qid()).collect::<Result<_, _>>()?;
                Fcall::Rwalk { qids }
            }
            TOPEN => Fcall::Topen {
                fid: d.u32()?,
                mode: d.u8()?,
            },
            ROPEN => Fcall::Ropen {
                qid: d.qid()?,
                iounit: d.u32()?,
            },
            TREAD => Fcall::Tread {
                fid: d.u32()?,
                offset: d.u64()?,
                count: d.u32()?,
            },
            RREAD => {
                let count = d.u32()? as usize;
                Fcall::Rread {
                    data: d.take(count)?.to_vec(),
                }
            }
            TWRITE => {
                let fid = d.u32()?;
                let offset = d.u64()?;
                let count = d.u32()? as usize;
                Fcall::Twrite {
                    fid,
                    offset,
                    data: d.take(count)?.to_vec(),
                }
            }
            RWRITE => Fcall::Rwrite { count: d.u32()? },
            TCLUNK => Fcall::Tclunk { fid: d.u32()? },
            RCLUNK => Fcall::Rclunk,
            other => return Err(NinepError::UnknownType(other)),
        };
        if d.pos != buf.len() {
            return Err(NinepError::Malformed(format!(
                "{} trailing bytes after {}",
                buf.len() - d.pos,
                body.name()
            )));
        }
        Ok(Self { tag, body })
    }

    /// Read one framed message from a stream.
    pub fn read_from<R: Read>(r: &mut R, max: u32) -> Result<Self, NinepError> {
        let mut size = [0u8; 4];
        r.read_exact(&mut size)?;
        let n = u32::from_le_bytes(size);
        if n < 7 || n > max.min(MAX_MSG) {
            return Err(NinepError::Malformed(format!("message size {n}")));
        }
        let mut buf = vec![0u8; n as usize];
        buf[..4].copy_from_slice(&size);
        r.read_exact(&mut buf[4..])?;
        Self::decode(&buf)
    }
}

#[derive(Default)]
struct Encoder(Vec<u8>);

impl Encoder {
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }
    fn bytes(&mut self, v: &[u8]) {
        self.0.extend_from_slice(v);
    }
    fn string(&mut self, s: &str) {
        self.u16(s.len() as u16);
        self.bytes(s.as_bytes());
    }
    fn qid(&mut self, q: &Qid) {
        self.u8(q.ty);
        self.u32(q.version);
        self.u64(q.path);
    }
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], NinepError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| NinepError::Malformed("message truncated".to_string()))?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], NinepError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, NinepError> {
        Ok(self.take(1)?[0])
    }
    fn u16(&mut self) -> Result<u16, NinepError> {
        self.array().map(u16::from_le_bytes)
    }
    fn u32(&mut self) -> Result<u32, NinepError> {
        self.array().map(u32::from_le_bytes)
    }
    fn u64(&mut self) -> Result<u64, NinepError> {
        self.array().map(u64::from_le_bytes)
    }
    fn string(&mut self) -> Result<String, NinepError> {
        let n = self.u16()? as usize;
        let raw = self.take(n)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| NinepError::Malformed("string is not UTF-8".to_string()))
    }
    fn qid(&mut self) -> Result<Qid, NinepError> {
        Ok(Qid {
            ty: self.u8()?,
            version: self.u32()?,
            path: self.u64()?,
        })
    }
}
