//! PLY (Polygon File Format) I/O
//!
//! PLY is a flexible format for storing 3D data with arbitrary properties.
//! Dense reconstructions usually arrive as `binary_little_endian` with
//! `x y z nx ny nz red green blue` vertices, so the reader handles all three
//! encodings and any property layout; only the `vertex` element is kept.

use crate::{Error, Result};
use nalgebra::{Point3, Vector3};
use recon_core::point_cloud::PointCloud;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Data encoding declared by the `format` header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl PlyFormat {
    fn parse(token: &str) -> Result<Self> {
        match token {
            "ascii" => Ok(Self::Ascii),
            "binary_little_endian" => Ok(Self::BinaryLittleEndian),
            "binary_big_endian" => Ok(Self::BinaryBigEndian),
            other => Err(Error::UnsupportedFormat(format!(
                "PLY format '{}' not supported",
                other
            ))),
        }
    }

    fn header_name(self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::BinaryLittleEndian => "binary_little_endian",
            Self::BinaryBigEndian => "binary_big_endian",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    fn parse(token: &str) -> Result<Self> {
        Ok(match token {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            other => return Err(Error::Parse(format!("Unknown PLY property type '{}'", other))),
        })
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }
}

#[derive(Debug, Clone)]
enum Property {
    Scalar {
        name: String,
        ty: ScalarType,
    },
    List {
        count_ty: ScalarType,
        item_ty: ScalarType,
    },
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    count: usize,
    properties: Vec<Property>,
}

#[derive(Debug)]
struct Header {
    format: PlyFormat,
    elements: Vec<Element>,
}

/// Read a PLY file from disk.
pub fn read_ply_file<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::InvalidInput(format!("Missing point cloud: {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?;
    read_ply(BufReader::new(file))
}

/// Read the vertex element of a PLY stream into a point cloud.
pub fn read_ply<R: BufRead>(mut reader: R) -> Result<PointCloud> {
    let header = read_header(&mut reader)?;

    for element in &header.elements {
        if element.name == "vertex" {
            return read_vertices(&mut reader, header.format, element);
        }
        skip_element(&mut reader, header.format, element)?;
    }

    Err(Error::InvalidData("PLY has no vertex element".to_string()))
}

fn read_header<R: BufRead>(reader: &mut R) -> Result<Header> {
    let mut line = String::new();
    let mut next_line = |reader: &mut R| -> Result<String> {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::Parse("Unexpected EOF in header".to_string()));
        }
        Ok(line.trim().to_string())
    };

    if next_line(reader)? != "ply" {
        return Err(Error::Parse("Missing 'ply' magic".to_string()));
    }

    let mut format = None;
    let mut elements: Vec<Element> = Vec::new();

    loop {
        let line = next_line(reader)?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [] => continue,
            ["end_header"] => break,
            ["comment", ..] | ["obj_info", ..] => continue,
            ["format", encoding, _version] => format = Some(PlyFormat::parse(encoding)?),
            ["element", name, count] => {
                let count = count
                    .parse()
                    .map_err(|_| Error::Parse(format!("Invalid element count: {}", count)))?;
                elements.push(Element {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            }
            ["property", "list", count_ty, item_ty, _name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| Error::Parse("Property before any element".to_string()))?;
                element.properties.push(Property::List {
                    count_ty: ScalarType::parse(count_ty)?,
                    item_ty: ScalarType::parse(item_ty)?,
                });
            }
            ["property", ty, name] => {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| Error::Parse("Property before any element".to_string()))?;
                element.properties.push(Property::Scalar {
                    name: name.to_string(),
                    ty: ScalarType::parse(ty)?,
                });
            }
            _ => return Err(Error::Parse(format!("Invalid header line: {}", line))),
        }
    }

    let format = format.ok_or_else(|| Error::Parse("Missing format line".to_string()))?;
    Ok(Header { format, elements })
}

/// Pulls scalar values out of the body regardless of encoding.
struct ValueReader<'a, R: BufRead> {
    reader: &'a mut R,
    format: PlyFormat,
    tokens: Vec<String>,
    cursor: usize,
}

impl<'a, R: BufRead> ValueReader<'a, R> {
    fn new(reader: &'a mut R, format: PlyFormat) -> Self {
        Self {
            reader,
            format,
            tokens: Vec::new(),
            cursor: 0,
        }
    }

    /// Ascii rows are one element per line.
    fn start_row(&mut self) -> Result<()> {
        if self.format != PlyFormat::Ascii {
            return Ok(());
        }
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(Error::Parse("Unexpected EOF in data".to_string()));
            }
            if !line.trim().is_empty() {
                break;
            }
        }
        self.tokens = line.split_whitespace().map(str::to_string).collect();
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self, ty: ScalarType) -> Result<f64> {
        match self.format {
            PlyFormat::Ascii => {
                let token = self
                    .tokens
                    .get(self.cursor)
                    .ok_or_else(|| Error::InvalidData("Not enough values in row".to_string()))?;
                self.cursor += 1;
                token
                    .parse::<f64>()
                    .map_err(|_| Error::Parse(format!("Invalid number: {}", token)))
            }
            PlyFormat::BinaryLittleEndian | PlyFormat::BinaryBigEndian => {
                let mut buf = [0u8; 8];
                let bytes = &mut buf[..ty.size()];
                self.reader.read_exact(bytes).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        Error::Parse("Unexpected EOF in data".to_string())
                    } else {
                        Error::Io(e)
                    }
                })?;
                Ok(decode_binary(bytes, ty, self.format == PlyFormat::BinaryLittleEndian))
            }
        }
    }
}

fn decode_binary(bytes: &[u8], ty: ScalarType, little: bool) -> f64 {
    macro_rules! decode {
        ($t:ty, $n:expr) => {{
            let mut raw = [0u8; $n];
            raw.copy_from_slice(&bytes[..$n]);
            if little {
                <$t>::from_le_bytes(raw) as f64
            } else {
                <$t>::from_be_bytes(raw) as f64
            }
        }};
    }
    match ty {
        ScalarType::I8 => bytes[0] as i8 as f64,
        ScalarType::U8 => bytes[0] as f64,
        ScalarType::I16 => decode!(i16, 2),
        ScalarType::U16 => decode!(u16, 2),
        ScalarType::I32 => decode!(i32, 4),
        ScalarType::U32 => decode!(u32, 4),
        ScalarType::F32 => decode!(f32, 4),
        ScalarType::F64 => decode!(f64, 8),
    }
}

fn skip_element<R: BufRead>(reader: &mut R, format: PlyFormat, element: &Element) -> Result<()> {
    let mut values = ValueReader::new(reader, format);
    for _ in 0..element.count {
        values.start_row()?;
        if format == PlyFormat::Ascii {
            continue;
        }
        for property in &element.properties {
            match property {
                Property::Scalar { ty, .. } => {
                    values.next(*ty)?;
                }
                Property::List { count_ty, item_ty } => {
                    let n = values.next(*count_ty)? as usize;
                    for _ in 0..n {
                        values.next(*item_ty)?;
                    }
                }
            }
        }
    }
    Ok(())
}

const MAX_PREALLOCATED_ROWS: usize = 1 << 20;

fn read_vertices<R: BufRead>(
    reader: &mut R,
    format: PlyFormat,
    element: &Element,
) -> Result<PointCloud> {
    let slot = |wanted: &[&str]| {
        element.properties.iter().position(|p| match p {
            Property::Scalar { name, .. } => wanted.contains(&name.as_str()),
            Property::List { .. } => false,
        })
    };

    let (x, y, z) = match (slot(&["x"]), slot(&["y"]), slot(&["z"])) {
        (Some(x), Some(y), Some(z)) => (x, y, z),
        _ => {
            return Err(Error::InvalidData(
                "Vertex element lacks x/y/z properties".to_string(),
            ))
        }
    };
    let normal_slots = match (slot(&["nx"]), slot(&["ny"]), slot(&["nz"])) {
        (Some(a), Some(b), Some(c)) => Some([a, b, c]),
        _ => None,
    };
    let color_slots = match (
        slot(&["red", "diffuse_red", "r"]),
        slot(&["green", "diffuse_green", "g"]),
        slot(&["blue", "diffuse_blue", "b"]),
    ) {
        (Some(a), Some(b), Some(c)) => Some([a, b, c]),
        _ => None,
    };
    let color_scale = color_slots.map(|slots| match &element.properties[slots[0]] {
        Property::Scalar { ty, .. } if ty.is_integer() => 1.0 / 255.0,
        _ => 1.0,
    });

    // Header counts are untrusted; grow past this as rows actually arrive.
    let reserve = element.count.min(MAX_PREALLOCATED_ROWS);
    let mut points = Vec::with_capacity(reserve);
    let mut normals = normal_slots.map(|_| Vec::with_capacity(reserve));
    let mut colors = color_slots.map(|_| Vec::with_capacity(reserve));

    let mut values = ValueReader::new(reader, format);
    let mut row = vec![0.0f64; element.properties.len()];

    for _ in 0..element.count {
        values.start_row()?;
        for (slot, property) in element.properties.iter().enumerate() {
            row[slot] = match property {
                Property::Scalar { ty, .. } => values.next(*ty)?,
                Property::List { count_ty, item_ty } => {
                    let n = values.next(*count_ty)? as usize;
                    for _ in 0..n {
                        values.next(*item_ty)?;
                    }
                    0.0
                }
            };
        }

        points.push(Point3::new(row[x] as f32, row[y] as f32, row[z] as f32));

        if let (Some(normals), Some([a, b, c])) = (normals.as_mut(), normal_slots) {
            normals.push(Vector3::new(row[a] as f32, row[b] as f32, row[c] as f32));
        }

        if let (Some(colors), Some([a, b, c]), Some(scale)) =
            (colors.as_mut(), color_slots, color_scale)
        {
            colors.push(Point3::new(
                (row[a] * scale).clamp(0.0, 1.0) as f32,
                (row[b] * scale).clamp(0.0, 1.0) as f32,
                (row[c] * scale).clamp(0.0, 1.0) as f32,
            ));
        }
    }

    let mut pc = PointCloud::new(points);
    pc.normals = normals;
    pc.colors = colors;

    tracing::debug!(
        points = pc.len(),
        normals = pc.normals.is_some(),
        colors = pc.colors.is_some(),
        "read PLY vertices"
    );

    Ok(pc)
}

/// Write a point cloud to a PLY file, creating parent directories.
pub fn write_ply_file<P: AsRef<Path>>(path: P, cloud: &PointCloud, format: PlyFormat) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_ply(&mut writer, cloud, format)?;
    writer.flush()?;
    Ok(())
}

/// Write a point cloud to PLY format
pub fn write_ply<W: Write>(writer: &mut W, cloud: &PointCloud, format: PlyFormat) -> Result<()> {
    let num_points = cloud.len();

    // Write header
    writeln!(writer, "ply")?;
    writeln!(writer, "format {} 1.0", format.header_name())?;
    writeln!(writer, "element vertex {}", num_points)?;
    writeln!(writer, "property float x")?;
    writeln!(writer, "property float y")?;
    writeln!(writer, "property float z")?;

    if cloud.normals.is_some() {
        writeln!(writer, "property float nx")?;
        writeln!(writer, "property float ny")?;
        writeln!(writer, "property float nz")?;
    }

    if cloud.colors.is_some() {
        writeln!(writer, "property uchar red")?;
        writeln!(writer, "property uchar green")?;
        writeln!(writer, "property uchar blue")?;
    }

    writeln!(writer, "end_header")?;

    // Write data
    for i in 0..num_points {
        let mut floats = vec![cloud.points[i].x, cloud.points[i].y, cloud.points[i].z];
        if let Some(ref normals) = cloud.normals {
            let n = normals[i];
            floats.extend_from_slice(&[n.x, n.y, n.z]);
        }
        let rgb = cloud.colors.as_ref().map(|colors| {
            let c = colors[i];
            [
                (c.x.clamp(0.0, 1.0) * 255.0).round() as u8,
                (c.y.clamp(0.0, 1.0) * 255.0).round() as u8,
                (c.z.clamp(0.0, 1.0) * 255.0).round() as u8,
            ]
        });

        match format {
            PlyFormat::Ascii => {
                let mut fields: Vec<String> = floats.iter().map(|v| v.to_string()).collect();
                if let Some(rgb) = rgb {
                    fields.extend(rgb.iter().map(|v| v.to_string()));
                }
                writeln!(writer, "{}", fields.join(" "))?;
            }
            PlyFormat::BinaryLittleEndian => {
                for v in &floats {
                    writer.write_all(&v.to_le_bytes())?;
                }
                if let Some(rgb) = rgb {
                    writer.write_all(&rgb)?;
                }
            }
            PlyFormat::BinaryBigEndian => {
                for v in &floats {
                    writer.write_all(&v.to_be_bytes())?;
                }
                if let Some(rgb) = rgb {
                    writer.write_all(&rgb)?;
                }
            }
        }
    }

    Ok(())
}
