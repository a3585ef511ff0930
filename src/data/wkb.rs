//! Decoding of the hex (E)WKB text PostGIS emits for `geometry::text`.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use thiserror::Error;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

#[derive(Debug, Error, PartialEq)]
pub enum WkbError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("unexpected end of data at byte {0}")]
    Truncated(usize),
    #[error("invalid byte order marker {0}")]
    ByteOrder(u8),
    #[error("unsupported geometry type {0}")]
    UnsupportedType(u32),
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

/// A decoded geometry and the SRID embedded in it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Ewkb {
    pub srid: Option<i32>,
    pub geometry: Geometry<f64>,
}

impl Ewkb {
    /// The coordinates of a point geometry.
    pub fn as_point(&self) -> Option<Point<f64>> {
        match self.geometry {
            Geometry::Point(point) => Some(point),
            _ => None,
        }
    }
}

/// Decodes a hex (E)WKB string. A missing value decodes to `None`.
pub fn decode_hex(hex_wkb: Option<&str>) -> Result<Option<Ewkb>, WkbError> {
    match hex_wkb {
        None => Ok(None),
        Some(text) => {
            let bytes = hex::decode(text.trim())?;
            decode(&bytes).map(Some)
        }
    }
}

pub fn decode(bytes: &[u8]) -> Result<Ewkb, WkbError> {
    let mut reader = Reader { bytes, pos: 0, little_endian: true };
    let (geometry, srid) = reader.geometry()?;
    let rest = bytes.len() - reader.pos;
    if rest > 0 {
        return Err(WkbError::TrailingBytes(rest));
    }
    Ok(Ewkb { srid, geometry })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    little_endian: bool,
}

#[derive(Clone, Copy)]
struct Dims {
    extra: usize,
}

impl<'a> Reader<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], WkbError> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or(WkbError::Truncated(self.pos))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, WkbError> {
        let raw = self.take::<4>()?;
        Ok(if self.little_endian { u32::from_le_bytes(raw) } else { u32::from_be_bytes(raw) })
    }

    fn f64(&mut self) -> Result<f64, WkbError> {
        let raw = self.take::<8>()?;
        Ok(if self.little_endian { f64::from_le_bytes(raw) } else { f64::from_be_bytes(raw) })
    }

    fn byte_order(&mut self) -> Result<(), WkbError> {
        let [marker] = self.take::<1>()?;
        self.little_endian = match marker {
            0 => false,
            1 => true,
            other => return Err(WkbError::ByteOrder(other)),
        };
        Ok(())
    }

    fn geometry(&mut self) -> Result<(Geometry<f64>, Option<i32>), WkbError> {
        self.byte_order()?;
        let raw_type = self.u32()?;

        let srid = if raw_type & EWKB_SRID != 0 {
            Some(self.u32()? as i32)
        } else {
            None
        };

        let mut extra = 0;
        if raw_type & EWKB_Z != 0 {
            extra += 1;
        }
        if raw_type & EWKB_M != 0 {
            extra += 1;
        }
        let iso_type = raw_type & 0x0FFF_FFFF;
        let base_type = iso_type % 1000;
        extra += match iso_type / 1000 {
            0 => 0,
            1 | 2 => 1,
            3 => 2,
            _ => return Err(WkbError::UnsupportedType(raw_type)),
        };
        let dims = Dims { extra };

        let geometry = match base_type {
            1 => Geometry::Point(Point(self.coord(dims)?)),
            2 => Geometry::LineString(self.line_string(dims)?),
            3 => Geometry::Polygon(self.polygon(dims)?),
            4 => {
                let points = self
                    .members()?
                    .into_iter()
                    .filter_map(|g| match g {
                        Geometry::Point(p) => Some(p),
                        _ => None,
                    })
                    .collect();
                Geometry::MultiPoint(MultiPoint(points))
            }
            5 => {
                let lines = self
                    .members()?
                    .into_iter()
                    .filter_map(|g| match g {
                        Geometry::LineString(l) => Some(l),
                        _ => None,
                    })
                    .collect();
                Geometry::MultiLineString(MultiLineString(lines))
            }
            6 => {
                let polygons = self
                    .members()?
                    .into_iter()
                    .filter_map(|g| match g {
                        Geometry::Polygon(p) => Some(p),
                        _ => None,
                    })
                    .collect();
                Geometry::MultiPolygon(MultiPolygon(polygons))
            }
            7 => Geometry::GeometryCollection(GeometryCollection(self.members()?)),
            _ => return Err(WkbError::UnsupportedType(raw_type)),
        };
        Ok((geometry, srid))
    }

    /// Members of a multi geometry each carry their own header.
    fn members(&mut self) -> Result<Vec<Geometry<f64>>, WkbError> {
        let count = self.u32()?;
        let parent_order = self.little_endian;
        let mut members = Vec::new();
        for _ in 0..count {
            let (member, _) = self.geometry()?;
            members.push(member);
        }
        self.little_endian = parent_order;
        Ok(members)
    }

    fn coord(&mut self, dims: Dims) -> Result<Coord<f64>, WkbError> {
        let x = self.f64()?;
        let y = self.f64()?;
        for _ in 0..dims.extra {
            self.f64()?;
        }
        Ok(Coord { x, y })
    }

    fn line_string(&mut self, dims: Dims) -> Result<LineString<f64>, WkbError> {
        let count = self.u32()?;
        let mut coords = Vec::new();
        for _ in 0..count {
            coords.push(self.coord(dims)?);
        }
        Ok(LineString(coords))
    }

    fn polygon(&mut self, dims: Dims) -> Result<Polygon<f64>, WkbError> {
        let rings = self.u32()?;
        let mut exterior = LineString(Vec::new());
        let mut interiors = Vec::new();
        for i in 0..rings {
            let ring = self.line_string(dims)?;
            if i == 0 {
                exterior = ring;
            } else {
                interiors.push(ring);
            }
        }
        Ok(Polygon::new(exterior, interiors))
    }
}
