//! ABI encoding of constructor and function calls.
//!
//! [`Value`]s carry no ABI type of their own; they are coerced against the parameter
//! types of the artifact's ABI here, right before encoding.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::{B256, Bytes},
};
use anyhow::Context;

use crate::{artifacts::Artifact, value::Value};

/// Find the function a call refers to.
///
/// `function` is either a bare name, matched by name and argument count, or a full
/// signature such as `upgradeTo(address)`. Returns `None` when nothing matches or a bare
/// name stays ambiguous.
pub fn find_function<'a>(abi: &'a JsonAbi, function: &str, arity: usize) -> Option<&'a Function> {
    if let Some((name, _)) = function.split_once('(') {
        return abi
            .function(name)?
            .iter()
            .find(|f| f.signature() == function && f.inputs.len() == arity);
    }

    let mut candidates = abi
        .function(function)?
        .iter()
        .filter(|f| f.inputs.len() == arity);
    let found = candidates.next()?;
    match candidates.next() {
        Some(_) => None,
        None => Some(found),
    }
}

/// Creation code of `artifact` followed by its encoded constructor arguments.
pub fn encode_deploy(artifact: &Artifact, args: &[Value]) -> anyhow::Result<Bytes> {
    let mut init_code = artifact.bytecode.to_vec();
    match artifact.abi.constructor() {
        Some(constructor) => {
            let values = coerce_params(&constructor.inputs, args)
                .with_context(|| format!("Invalid constructor arguments for {}", artifact.name))?;
            let encoded = constructor
                .abi_encode_input(&values)
                .with_context(|| format!("Failed to encode constructor of {}", artifact.name))?;
            init_code.extend_from_slice(&encoded);
        }
        None if args.is_empty() => {}
        None => anyhow::bail!(
            "{} has no constructor but {} argument(s) were given",
            artifact.name,
            args.len()
        ),
    }
    Ok(init_code.into())
}

/// Selector and encoded arguments of a call to `function` on `artifact`.
pub fn encode_function(artifact: &Artifact, function: &str, args: &[Value]) -> anyhow::Result<Bytes> {
    let func = find_function(&artifact.abi, function, args.len()).with_context(|| {
        format!(
            "{} has no unique function `{}` taking {} argument(s)",
            artifact.name,
            function,
            args.len()
        )
    })?;
    let values = coerce_params(&func.inputs, args)
        .with_context(|| format!("Invalid arguments for {}.{}", artifact.name, func.signature()))?;
    let calldata = func
        .abi_encode_input(&values)
        .with_context(|| format!("Failed to encode {}.{}", artifact.name, func.signature()))?;
    Ok(calldata.into())
}

fn coerce_params(params: &[Param], args: &[Value]) -> anyhow::Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        anyhow::bail!("expected {} argument(s), got {}", params.len(), args.len());
    }
    params
        .iter()
        .zip(args)
        .map(|(param, value)| {
            let ty = param
                .resolve()
                .with_context(|| format!("Unsupported parameter type `{}`", param.ty))?;
            coerce(&ty, value).with_context(|| {
                let name = if param.name.is_empty() { "<unnamed>" } else { &param.name };
                format!("argument `{}` ({})", name, param.ty)
            })
        })
        .collect()
}

/// Coerce a value to a Solidity type. Strings fall back to the type's own parser.
fn coerce(ty: &DynSolType, value: &Value) -> anyhow::Result<DynSolValue> {
    let coerced = match (ty, value) {
        (_, Value::String(s)) if !matches!(ty, DynSolType::String) => ty
            .coerce_str(s)
            .with_context(|| format!("`{s}` is not a valid {ty}"))?,
        (DynSolType::Address, _) => DynSolValue::Address(
            value
                .to_address()
                .with_context(|| format!("{value} is not an address"))?,
        ),
        (DynSolType::Bool, Value::Bool(b)) => DynSolValue::Bool(*b),
        (DynSolType::Uint(bits), Value::Uint(n)) => {
            if n.bit_len() > *bits {
                anyhow::bail!("{n} does not fit in {ty}");
            }
            DynSolValue::Uint(*n, *bits)
        }
        (DynSolType::Int(_), Value::Uint(n)) => ty
            .coerce_str(&n.to_string())
            .with_context(|| format!("{n} does not fit in {ty}"))?,
        (DynSolType::Bytes, Value::Bytes(b)) => DynSolValue::Bytes(b.to_vec()),
        (DynSolType::Bytes, Value::Hash(h)) => DynSolValue::Bytes(h.to_vec()),
        (DynSolType::FixedBytes(32), Value::Hash(h)) => DynSolValue::FixedBytes(*h, 32),
        (DynSolType::FixedBytes(size), Value::Bytes(b)) if b.len() == *size => {
            DynSolValue::FixedBytes(B256::right_padding_from(b), *size)
        }
        (DynSolType::String, Value::String(s)) => DynSolValue::String(s.clone()),
        (DynSolType::Array(inner), Value::Array(items)) => DynSolValue::Array(
            items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<anyhow::Result<_>>()?,
        ),
        (DynSolType::FixedArray(inner, len), Value::Array(items)) => {
            if items.len() != *len {
                anyhow::bail!("expected {} element(s), got {}", len, items.len());
            }
            DynSolValue::FixedArray(
                items
                    .iter()
                    .map(|item| coerce(inner, item))
                    .collect::<anyhow::Result<_>>()?,
            )
        }
        (DynSolType::Tuple(types), Value::Array(items)) => {
            if items.len() != types.len() {
                anyhow::bail!("expected a tuple of {}, got {} item(s)", types.len(), items.len());
            }
            DynSolValue::Tuple(
                types
                    .iter()
                    .zip(items)
                    .map(|(ty, item)| coerce(ty, item))
                    .collect::<anyhow::Result<_>>()?,
            )
        }
        _ => anyhow::bail!("{value} cannot be used as {ty}"),
    };
    Ok(coerced)
}
