use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;

use super::{Manifest, ManifestEntry, ManifestError};

/// Global the deployed script assigns the manifest to.
pub const MANIFEST_GLOBAL: &str = "self.assetsManifest";

#[derive(Serialize, Deserialize)]
struct WireManifest {
    assets: Vec<WireAsset>,
    version: String,
}

#[derive(Serialize, Deserialize)]
struct WireAsset {
    hash: String,
    url: String,
}

impl From<&Manifest> for WireManifest {
    fn from(manifest: &Manifest) -> Self {
        Self {
            assets: manifest
                .entries
                .iter()
                .map(|entry| WireAsset {
                    hash: entry.hash.to_string(),
                    url: entry.path.clone(),
                })
                .collect(),
            version: manifest.version.clone(),
        }
    }
}

pub fn load_manifest(path: &Path) -> Result<Manifest, ManifestError> {
    let contents = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&contents)
}

/// Parse a manifest from either bare JSON or the deployed
/// `self.assetsManifest = { ... };` script form, then validate it.
pub fn parse_manifest(contents: &str) -> Result<Manifest, ManifestError> {
    let body = json_body(contents)?;
    let wire: WireManifest =
        serde_json::from_str(body).map_err(|err| ManifestError::Parse(err.to_string()))?;

    let mut entries = Vec::with_capacity(wire.assets.len());
    for asset in wire.assets {
        let hash = asset
            .hash
            .parse()
            .map_err(|source| ManifestError::InvalidHash {
                path: asset.url.clone(),
                source,
            })?;
        entries.push(ManifestEntry::new(asset.url, hash));
    }

    let manifest = Manifest::new(wire.version, entries);
    manifest.validate()?;
    Ok(manifest)
}

fn json_body(contents: &str) -> Result<&str, ManifestError> {
    let trimmed = contents.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end());
    }
    let Some((target, value)) = trimmed.split_once('=') else {
        return Err(ManifestError::Parse(
            "expected a JSON object or a `<name> = {...};` assignment".to_string(),
        ));
    };
    if !is_assignment_target(target.trim()) {
        return Err(ManifestError::Parse(format!(
            "unsupported assignment target '{}'",
            target.trim()
        )));
    }
    let value = value.trim();
    Ok(value.strip_suffix(';').unwrap_or(value).trim_end())
}

fn is_assignment_target(target: &str) -> bool {
    !target.is_empty()
        && target.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
}

/// Render the manifest exactly as the publishing build emits it.
pub fn render_script(manifest: &Manifest) -> Result<String, ManifestError> {
    let mut out = Vec::new();
    write!(out, "{MANIFEST_GLOBAL} = ").map_err(render_err)?;
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, DeployedFormatter::default());
    WireManifest::from(manifest)
        .serialize(&mut serializer)
        .map_err(|err| ManifestError::Parse(err.to_string()))?;
    out.extend_from_slice(b";\n");
    String::from_utf8(out).map_err(|err| ManifestError::Parse(err.to_string()))
}

/// Render the manifest as plain pretty-printed JSON.
pub fn render_json(manifest: &Manifest) -> Result<String, ManifestError> {
    serde_json::to_string_pretty(&WireManifest::from(manifest))
        .map_err(|err| ManifestError::Parse(err.to_string()))
}

fn render_err(err: io::Error) -> ManifestError {
    ManifestError::Parse(err.to_string())
}

/// Two-space indentation, CRLF line breaks and `\/`-escaped slashes, matching
/// the serializer used by the publishing build.
#[derive(Default)]
struct DeployedFormatter {
    indent: usize,
    has_value: bool,
}

impl DeployedFormatter {
    fn newline<W: ?Sized + io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b"\r\n")?;
        for _ in 0..self.indent {
            writer.write_all(b"  ")?;
        }
        Ok(())
    }
}

impl Formatter for DeployedFormatter {
    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.indent += 1;
        self.has_value = false;
        writer.write_all(b"[")
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.indent -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(b"]")
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            writer.write_all(b",")?;
        }
        self.newline(writer)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.indent += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.indent -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(b"}")
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if !first {
            writer.write_all(b",")?;
        }
        self.newline(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, _writer: &mut W) -> io::Result<()> {
        self.has_value = true;
        Ok(())
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut rest = fragment;
        while let Some(pos) = rest.find('/') {
            writer.write_all(rest[..pos].as_bytes())?;
            writer.write_all(b"\\/")?;
            rest = &rest[pos + 1..];
        }
        writer.write_all(rest.as_bytes())
    }
}
