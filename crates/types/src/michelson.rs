// SPDX-FileCopyrightText: 2024 TriliTech <contact@trili.tech>
//
// SPDX-License-Identifier: MIT

//! Michelson `list` and `map` values.
//!
//! Every other value the bridge forges (pairs, options, nats, bytes,
//! strings, contracts) is one of the kernel SDK michelson types; only
//! Micheline sequences are added here, with the same tezos-encoding
//! traits so that they nest with the SDK types.

use nom::bytes::complete::tag;
use nom::combinator::{all_consuming, map};
use nom::sequence::{pair, preceded};
use tezos_data_encoding::enc::{self, BinError, BinResult, BinWriter};
use tezos_data_encoding::nom::{self as nom_read, NomReader, NomResult};

/// Sequence case tag of the Micheline encoding.
const MICHELINE_SEQ_TAG: u8 = 2;

/// 2-arguments primitive (without annotations) case tag.
const MICHELINE_PRIM_2_ARGS_NO_ANNOTS_TAG: u8 = 7;

/// `("Elt", D_Elt)` case tag.
const ELT_TAG: u8 = 4;

/// Prefix of `PACK`ed values.
pub const PACK_PREFIX: u8 = 0x05;

/// Michelson `list`, encoded as a Micheline sequence.
#[derive(Debug, PartialEq, Eq)]
pub struct MichelsonList<T>(pub Vec<T>);

/// Binding of a Michelson `map`.
#[derive(Debug, PartialEq, Eq)]
pub struct MichelsonElt<K, V>(pub K, pub V);

/// Michelson `map`: a sequence of bindings, keys strictly increasing.
pub type MichelsonMap<K, V> = MichelsonList<MichelsonElt<K, V>>;

impl<T: NomReader> NomReader for MichelsonList<T> {
    fn nom_read(input: &[u8]) -> NomResult<Self> {
        map(
            preceded(
                tag([MICHELINE_SEQ_TAG]),
                nom_read::dynamic(nom_read::list(T::nom_read)),
            ),
            MichelsonList,
        )(input)
    }
}

impl<T: BinWriter> BinWriter for MichelsonList<T> {
    fn bin_write(&self, output: &mut Vec<u8>) -> BinResult {
        enc::put_byte(&MICHELINE_SEQ_TAG, output);
        enc::dynamic(enc::list(T::bin_write))(&self.0, output)
    }
}

impl<K: NomReader, V: NomReader> NomReader for MichelsonElt<K, V> {
    fn nom_read(input: &[u8]) -> NomResult<Self> {
        map(
            preceded(
                tag([MICHELINE_PRIM_2_ARGS_NO_ANNOTS_TAG, ELT_TAG]),
                pair(K::nom_read, V::nom_read),
            ),
            |(key, value)| MichelsonElt(key, value),
        )(input)
    }
}

impl<K: BinWriter, V: BinWriter> BinWriter for MichelsonElt<K, V> {
    fn bin_write(&self, output: &mut Vec<u8>) -> BinResult {
        enc::put_bytes(&[MICHELINE_PRIM_2_ARGS_NO_ANNOTS_TAG, ELT_TAG], output);
        self.0.bin_write(output)?;
        self.1.bin_write(output)
    }
}

/// Forged (binary) form of a value.
pub fn forge<T: BinWriter>(value: &T) -> Result<Vec<u8>, BinError> {
    let mut output = Vec::new();
    value.bin_write(&mut output)?;
    Ok(output)
}

/// Inverse of [forge], `None` unless the whole input is exactly one value.
pub fn unforge<T: NomReader>(input: &[u8]) -> Option<T> {
    all_consuming(T::nom_read)(input)
        .ok()
        .map(|(_, value)| value)
}

/// `PACK`ed form: the forged value behind [PACK_PREFIX].
pub fn pack<T: BinWriter>(value: &T) -> Result<Vec<u8>, BinError> {
    let mut output = vec![PACK_PREFIX];
    value.bin_write(&mut output)?;
    Ok(output)
}

/// Inverse of [pack].
pub fn unpack<T: NomReader>(input: &[u8]) -> Option<T> {
    all_consuming(preceded(tag([PACK_PREFIX]), T::nom_read))(input)
        .ok()
        .map(|(_, value)| value)
}
