//! `fofb` — command-line access to FOFB gateware register maps.
//!
//! ```text
//! USAGE:
//!   fofb layouts                           List built-in layouts
//!   fofb dump <kind> <abi>                 Print a register map
//!   fofb resolve <kind> <abi> <path>       Show where a path lands
//!   fofb read  --resource <file> --kind <kind> <path>          Read a field
//!   fofb write --resource <file> --kind <kind> <path> <value>  Write a field
//! ```
//!
//! Addresses and raw values accept decimal or `0x` hex.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use fofb_driver::{BindConfig, LayoutRegistry, MmapTransport, PeripheralBinding, VersionResolver};
use fofb_regmap::{AbiVersion, FieldSemantic, FixedPointFormat, LayoutDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fofb", about = "FOFB gateware register-map CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// List every built-in layout.
    Layouts,
    /// Print the register map of one layout.
    Dump {
        /// Peripheral kind (e.g. fofb_processing).
        kind: String,
        /// ABI revision (e.g. v2).
        abi: AbiVersion,
    },
    /// Resolve a path to its address, mask and semantic.
    Resolve {
        /// Peripheral kind (e.g. fofb_processing).
        kind: String,
        /// ABI revision (e.g. v2).
        abi: AbiVersion,
        /// Register or field path (e.g. ch[3].acc.gain).
        path: String,
    },
    /// Read a register or field.
    Read {
        #[command(flatten)]
        target: Target,
        /// Register or field path.
        path: String,
        /// Decode as signed fixed-point.
        #[arg(long)]
        fixed: bool,
    },
    /// Write a register or field.
    Write {
        #[command(flatten)]
        target: Target,
        /// Register or field path.
        path: String,
        /// Value: raw integer, or a real number with --fixed.
        value: String,
        /// Encode as signed fixed-point.
        #[arg(long)]
        fixed: bool,
    },
}

/// Peripheral instance on a mapped resource
#[derive(Args)]
struct Target {
    /// sysfs resource file (or any file holding a register image).
    #[arg(long, env = "FOFB_RESOURCE")]
    resource: PathBuf,
    /// Peripheral base address within the resource.
    #[arg(long, default_value = "0", value_parser = parse_u64)]
    base: u64,
    /// Peripheral kind (e.g. fofb_sys_id).
    #[arg(long)]
    kind: String,
    /// ABI revision; the newest known one when omitted.
    #[arg(long)]
    abi: Option<AbiVersion>,
    /// Peripheral window size, checked against the layout.
    #[arg(long, value_parser = parse_u64)]
    window: Option<u64>,
    /// Fixed-point format override, `name=INT.FRAC` (e.g. coeff=15.17).
    #[arg(long = "format", value_parser = parse_format)]
    formats: Vec<(String, FixedPointFormat)>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Cmd::Layouts => cmd_layouts()?,
        Cmd::Dump { kind, abi } => cmd_dump(&kind, abi)?,
        Cmd::Resolve { kind, abi, path } => cmd_resolve(&kind, abi, &path)?,
        Cmd::Read {
            target,
            path,
            fixed,
        } => cmd_read(&target, &path, fixed)?,
        Cmd::Write {
            target,
            path,
            value,
            fixed,
        } => cmd_write(&target, &path, &value, fixed)?,
    }

    Ok(())
}

fn cmd_layouts() -> Result<()> {
    let registry = LayoutRegistry::builtin()?;
    println!("Built-in layouts: {}", registry.len());
    println!();
    for layout in registry.iter() {
        let entries = layout.entries();
        let registers: usize = entries.iter().map(fofb_regmap::MapEntry::instances).sum();
        println!(
            "  {:<18} {:<3}  {:#8x} bytes  {:>5} registers",
            layout.kind(),
            layout.version().to_string(),
            layout.total_size(),
            registers
        );
    }
    Ok(())
}

fn cmd_dump(kind: &str, abi: AbiVersion) -> Result<()> {
    let layout = layout(kind, abi)?;
    println!("{} {} ({:#x} bytes)", layout.kind(), layout.version(), layout.total_size());
    println!();
    for entry in layout.entries() {
        let dims: String = entry
            .dims
            .iter()
            .map(|(count, stride)| format!(" [{count} x {stride:#x}]"))
            .collect();
        println!(
            "{:#07x}  w{}  {:<3}  {}{dims}",
            entry.offset,
            entry.width_bytes * 8,
            entry.access.to_string(),
            entry.path
        );
        for field in &entry.fields {
            let msb = field.shift() + field.width_bits() - 1;
            println!(
                "           [{msb:>2}:{:<2}]  {:<12} {}",
                field.shift(),
                field.name(),
                describe(field.semantic())
            );
        }
    }
    if !layout.formats().is_empty() {
        println!();
        for source in layout.formats() {
            println!("format `{}`: {:?}", source.name(), source.encoding());
        }
    }
    Ok(())
}

fn cmd_resolve(kind: &str, abi: AbiVersion, path: &str) -> Result<()> {
    let layout = layout(kind, abi)?;
    if let Ok(region) = layout.resolve_region(path) {
        println!("Path     : {}", region.path);
        println!("Address  : {:#x}", region.address);
        println!("Elements : {} x {:#x}", region.count, region.stride);
        println!("Width    : {} bits", region.width.bits());
        println!("Access   : {}", region.access);
        println!("Semantic : {}", describe(&region.semantic));
        return Ok(());
    }
    let field = layout.resolve(path)?;
    println!("Path     : {}", field.path);
    println!("Address  : {:#x}", field.address);
    println!("Width    : {} bits", field.width.bits());
    println!("Mask     : {:#010x} (shift {})", field.mask, field.shift);
    println!("Access   : {}", field.access);
    println!("Semantic : {}", describe(&field.semantic));
    Ok(())
}

fn cmd_read(target: &Target, path: &str, fixed: bool) -> Result<()> {
    let binding = bind(target)?;
    if fixed {
        println!("{}", binding.read_fixed(path)?);
    } else {
        let value = binding.read(path)?;
        println!("{value:#x} ({value})");
    }
    Ok(())
}

fn cmd_write(target: &Target, path: &str, value: &str, fixed: bool) -> Result<()> {
    let binding = bind(target)?;
    if fixed {
        let value: f64 = value
            .parse()
            .with_context(|| format!("`{value}` is not a number"))?;
        binding.write_fixed(path, value)?;
    } else {
        let raw = u32::try_from(parse_u64(value).map_err(anyhow::Error::msg)?)
            .with_context(|| format!("`{value}` does not fit 32 bits"))?;
        binding.write(path, raw)?;
    }
    println!("{path} <- {value}");
    Ok(())
}

fn layout(kind: &str, abi: AbiVersion) -> Result<Arc<LayoutDescriptor>> {
    let registry = LayoutRegistry::builtin()?;
    if !registry.has_kind(kind) {
        bail!("Unknown peripheral kind: {kind}");
    }
    registry.get(kind, abi).with_context(|| {
        let known: Vec<String> = registry.versions(kind).iter().map(ToString::to_string).collect();
        format!("{kind} has no revision {abi} (known: {})", known.join(", "))
    })
}

fn bind(target: &Target) -> Result<PeripheralBinding> {
    let resolver = VersionResolver::builtin()?;
    let abi = match target.abi {
        Some(abi) => abi,
        None => resolver
            .registry()
            .versions(&target.kind)
            .last()
            .copied()
            .with_context(|| format!("Unknown peripheral kind: {}", target.kind))?,
    };
    let mut config = BindConfig::new().with_version(abi);
    if let Some(size) = target.window {
        config = config.with_window_size(size);
    }
    for (name, format) in &target.formats {
        config = config.with_format(name.clone(), *format);
    }

    let transport = MmapTransport::open(&target.resource)
        .with_context(|| format!("Cannot map {}", target.resource.display()))?;
    debug!("{} mapped, {:#x} bytes", target.resource.display(), transport.size());
    Ok(resolver.bind(&target.kind, target.base, transport, &config)?)
}

fn describe(semantic: &FieldSemantic) -> String {
    match semantic {
        FieldSemantic::SignedFixedPoint(fofb_regmap::FormatRef::Static(format)) => {
            format!("fixed-point {format}")
        }
        FieldSemantic::SignedFixedPoint(fofb_regmap::FormatRef::Discovered(name)) => {
            format!("fixed-point `{name}`")
        }
        FieldSemantic::Enum(variants) => {
            let names: Vec<String> = variants
                .iter()
                .map(|v| format!("{}={}", v.name, v.value))
                .collect();
            format!("enum {{{}}}", names.join(", "))
        }
        other => other.kind().to_string(),
    }
}

fn parse_u64(s: &str) -> std::result::Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("`{s}`: {e}"))
}

fn parse_format(s: &str) -> std::result::Result<(String, FixedPointFormat), String> {
    let (name, widths) = s
        .split_once('=')
        .ok_or_else(|| format!("`{s}`: expected name=INT.FRAC"))?;
    let (int, frac) = widths
        .split_once('.')
        .ok_or_else(|| format!("`{s}`: expected name=INT.FRAC"))?;
    let int = int.parse().map_err(|e| format!("`{s}`: {e}"))?;
    let frac = frac.parse().map_err(|e| format!("`{s}`: {e}"))?;
    let format = FixedPointFormat::checked(int, frac).map_err(|e| e.to_string())?;
    Ok((name.to_string(), format))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_hex_or_decimal() {
        assert_eq!(parse_u64("0x1000"), Ok(0x1000));
        assert_eq!(parse_u64("4096"), Ok(4096));
        assert_eq!(parse_u64("0xDEAD_BEEF"), Ok(0xDEAD_BEEF));
        assert!(parse_u64("0xZZ").is_err());
    }

    #[test]
    fn format_overrides() {
        assert_eq!(
            parse_format("coeff=15.17"),
            Ok(("coeff".to_string(), FixedPointFormat::new(15, 17)))
        );
        assert!(parse_format("coeff=30.30").is_err());
        assert!(parse_format("coeff").is_err());
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from([
            "fofb", "read", "--resource", "/tmp/bar0", "--base", "0x10000", "--kind",
            "fofb_processing", "--abi", "v2", "ch[0].acc.gain", "--fixed",
        ])
        .unwrap();
        match cli.command {
            Cmd::Read { target, path, fixed } => {
                assert_eq!(target.base, 0x10000);
                assert_eq!(target.abi, Some(AbiVersion::new(2)));
                assert_eq!(path, "ch[0].acc.gain");
                assert!(fixed);
            }
            _ => panic!("expected read"),
        }
    }
}
