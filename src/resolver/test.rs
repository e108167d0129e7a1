use super::signing::{
    compact_size, generate_signing_serialization, signing_serialization_digest, SigningAlgorithm,
};
use super::*;
use crate::environment::{Secp256k1, Sha256, TransactionContext};
use crate::parser::parse;
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct FakeSha256;

impl Sha256 for FakeSha256 {
    fn hash(&self, input: &[u8]) -> [u8; 32] {
        let mut digest = [0u8; 32];
        for (i, byte) in input.iter().enumerate() {
            let slot = &mut digest[i % 32];
            *slot = slot.wrapping_add(*byte).rotate_left(3) ^ (i as u8);
        }
        digest[31] ^= input.len() as u8;
        digest
    }
}

struct FakeSecp256k1;

impl Secp256k1 for FakeSecp256k1 {
    fn derive_public_key_compressed(&self, private_key: &[u8]) -> Result<Vec<u8>, String> {
        if private_key.is_empty() {
            return Err("invalid private key".to_string());
        }
        Ok([&[0x02][..], private_key].concat())
    }

    fn sign_message_hash_der(
        &self,
        _private_key: &[u8],
        message_hash: &[u8; 32],
    ) -> Result<Vec<u8>, String> {
        Ok([&[0x30][..], &message_hash[..4]].concat())
    }

    fn sign_message_hash_schnorr(
        &self,
        _private_key: &[u8],
        message_hash: &[u8; 32],
    ) -> Result<Vec<u8>, String> {
        Ok([&[0x5c][..], &message_hash[..4]].concat())
    }
}

fn context() -> TransactionContext {
    TransactionContext {
        version: 2,
        transaction_outpoints: vec![0x01, 0x02, 0x03],
        transaction_sequence_numbers: vec![0xff, 0xff, 0xff, 0xff],
        outpoint_transaction_hash: [0xab; 32],
        outpoint_index: 1,
        covered_bytecode: vec![0x51, 0x87],
        output_value: 10_000,
        sequence_number: 0xffff_fffe,
        corresponding_output: Some(vec![0x07, 0x08]),
        transaction_outputs: vec![0x07, 0x08, 0x09],
        locktime: 0,
    }
}

fn environment() -> CompilationEnvironment {
    CompilationEnvironment::new()
        .with_variable("owner", Variable::Key)
        .with_variable("nonce", Variable::WalletData)
        .with_variable("memo", Variable::AddressData)
        .with_variable("height", Variable::CurrentBlockHeight)
        .with_variable("time", Variable::CurrentBlockTime)
}

fn resolve(src: &str, data: &CompilationData, environment: &CompilationEnvironment) -> ResolvedScript {
    let script = parse(src).unwrap();
    let resolver = IdentifierResolver::new(None, data, environment, &[]);
    resolve_script(&script, &|identifier: &str| resolver.resolve(identifier))
}

fn resolve_one(
    identifier: &str,
    data: &CompilationData,
    environment: &CompilationEnvironment,
) -> Result<ResolvedIdentifier, ResolutionError> {
    IdentifierResolver::new(None, data, environment, &[]).resolve(identifier)
}

#[test]
fn test_one_segment_per_node() {
    let src = "OP_1 // one\n<0x02 $(<3> OP_DUP)>\n'text' unknown 0xabc";
    let script = parse(src).unwrap();
    let data = CompilationData::new();
    let environment = environment();
    let resolved = resolve(src, &data, &environment);

    fn check(script: &[Spanned], resolved: &[ResolvedSegment]) {
        assert_eq!(script.len(), resolved.len());
        for (node, segment) in script.iter().zip(resolved) {
            assert_eq!(node.range, segment.range());
            match (node.expr.children(), segment.children()) {
                (Some(children), Some(segments)) => check(children, segments),
                (None, None) => {}
                (children, segments) => {
                    panic!("shape mismatch: {children:?} against {segments:?}")
                }
            }
        }
    }
    check(&script, &resolved);
}

#[test]
fn test_literals() {
    let data = CompilationData::new();
    let environment = environment();
    let resolved = resolve("0x0102 'ab' -1 0 256", &data, &environment);
    let values = resolved
        .iter()
        .map(|segment| match segment {
            ResolvedSegment::Bytecode {
                value,
                provenance: Provenance::Literal,
                ..
            } => value.clone(),
            segment => panic!("expected a literal, found {segment:?}"),
        })
        .collect::<Vec<_>>();
    assert_eq!(
        values,
        vec![
            vec![0x01, 0x02],
            b"ab".to_vec(),
            vec![0x81],
            vec![],
            vec![0x00, 0x01]
        ]
    );
}

#[test]
fn test_odd_hex_literal() {
    let data = CompilationData::new();
    let resolved = resolve("0xabc", &data, &environment());
    assert_eq!(
        resolved,
        vec![ResolvedSegment::Error {
            message: "Improperly formed HexLiteral. HexLiteral must have a length divisible by 2, but this HexLiteral has a length of 3.".to_string(),
            range: Range::new(1, 1, 1, 6),
        }]
    );
}

#[test]
fn test_comment_passes_through() {
    let data = CompilationData::new();
    let resolved = resolve("/* note */", &data, &environment());
    assert_eq!(
        resolved,
        vec![ResolvedSegment::Comment {
            value: " note ".to_string(),
            range: Range::new(1, 1, 1, 11),
        }]
    );
}

#[test]
fn test_opcode_and_unknown_identifier() {
    let data = CompilationData::new();
    let environment = environment();
    assert_eq!(
        resolve_one("OP_ADD", &data, &environment),
        Ok(ResolvedIdentifier::new(vec![0x93], Provenance::Opcode))
    );
    let error = resolve_one("nothing", &data, &environment).unwrap_err();
    assert_eq!(error.to_string(), "Unknown identifier \"nothing\".");
}

#[test]
fn test_every_error_is_collected() {
    let data = CompilationData::new();
    let resolved = resolve("first <second 0xa> OP_1", &data, &environment());
    let errors = resolution_errors(&resolved);
    assert_eq!(errors.len(), 3);
    assert_eq!(errors[0].range, Range::new(1, 1, 1, 6));
    assert_eq!(errors[1].range, Range::new(1, 8, 1, 14));
    assert_eq!(errors[2].range, Range::new(1, 15, 1, 18));
}

#[test]
fn test_cycle_rejects_every_identifier() {
    let data = CompilationData::new();
    let environment = environment();
    let ids = vec!["A".to_string(), "B".to_string()];
    let resolver = IdentifierResolver::new(Some("A"), &data, &environment, &ids);
    let expected = Err(ResolutionError::CircularDependency {
        cycle: vec!["A".to_string(), "B".to_string(), "A".to_string()],
    });
    assert_eq!(resolver.resolve("OP_1"), expected);
    assert_eq!(resolver.resolve("B"), expected);
    assert_eq!(
        expected.unwrap_err().to_string(),
        "A circular dependency was encountered: A → B → A."
    );
}

#[test]
fn test_wallet_and_address_data() {
    let data = CompilationData::new().with_wallet_data("nonce", vec![0x2a]);
    let environment = environment();
    assert_eq!(
        resolve_one("nonce", &data, &environment),
        Ok(ResolvedIdentifier::new(
            vec![0x2a],
            Provenance::Variable("nonce".to_string())
        ))
    );
    assert_eq!(
        resolve_one("memo", &data, &environment),
        Err(ResolutionError::MissingVariableData {
            identifier: "memo".to_string(),
            kind: "AddressData",
            variable_id: "memo".to_string(),
        })
    );
    assert_eq!(
        resolve_one("nonce.value", &data, &environment),
        Err(ResolutionError::UnknownOperation {
            identifier: "nonce.value".to_string(),
            operation: "value".to_string(),
        })
    );
}

#[test]
fn test_block_height_and_time() {
    let environment = environment();
    let data = CompilationData::new()
        .with_block_height(1_000_000)
        .with_block_time(1_600_000_000);
    assert_eq!(
        resolve_one("height", &data, &environment).unwrap().bytecode,
        vec![0x40, 0x42, 0x0f]
    );
    assert_eq!(
        resolve_one("time", &data, &environment).unwrap().bytecode,
        1_600_000_000u32.to_le_bytes().to_vec()
    );

    let early = CompilationData::new().with_block_time(499_999_999);
    assert_eq!(
        resolve_one("time", &early, &environment),
        Err(ResolutionError::InvalidBlockTime { time: 499_999_999 })
    );
    assert_eq!(
        resolve_one("height", &early, &environment),
        Err(ResolutionError::MissingCompilationData {
            identifier: "height".to_string(),
            field: "current_block_height",
        })
    );
}

#[test]
fn test_public_key() {
    let stored = CompilationData::new().with_public_key("owner", vec![0x03, 0x01]);
    assert_eq!(
        resolve_one("owner.public_key", &stored, &environment())
            .unwrap()
            .bytecode,
        vec![0x03, 0x01]
    );

    let private = CompilationData::new().with_private_key("owner", vec![0x11]);
    assert_eq!(
        resolve_one("owner.public_key", &private, &environment()),
        Err(ResolutionError::MissingSecp256k1 {
            identifier: "owner.public_key".to_string()
        })
    );
    let environment = environment().with_secp256k1(Arc::new(FakeSecp256k1));
    assert_eq!(
        resolve_one("owner.public_key", &private, &environment)
            .unwrap()
            .bytecode,
        vec![0x02, 0x11]
    );
    assert_eq!(
        resolve_one("owner.public_key", &CompilationData::new(), &environment),
        Err(ResolutionError::MissingPublicKey {
            identifier: "owner.public_key".to_string()
        })
    );
    assert_eq!(
        resolve_one("owner", &private, &environment),
        Err(ResolutionError::MissingKeyOperation {
            identifier: "owner".to_string()
        })
    );
    assert_eq!(
        resolve_one("owner.secret", &private, &environment),
        Err(ResolutionError::UnknownOperation {
            identifier: "owner.secret".to_string(),
            operation: "secret".to_string(),
        })
    );
}

#[test]
fn test_provided_signature_wins() {
    let data = CompilationData::new().with_signature("owner.signature.all_outputs", vec![0xee]);
    assert_eq!(
        resolve_one("owner.signature.all_outputs", &data, &environment())
            .unwrap()
            .bytecode,
        vec![0xee]
    );
}

#[test]
fn test_signature_requirements() {
    let identifier = "owner.signature.all_outputs";
    let missing = |field: &str| -> ResolutionError {
        let identifier = identifier.to_string();
        match field {
            "context" => ResolutionError::MissingTransactionContext { identifier },
            "key" => ResolutionError::MissingPrivateKey { identifier },
            "sha256" => ResolutionError::MissingSha256 { identifier },
            _ => ResolutionError::MissingSecp256k1 { identifier },
        }
    };

    let data = CompilationData::new();
    assert_eq!(
        resolve_one(identifier, &data, &environment()),
        Err(missing("context"))
    );
    let data = data.with_transaction_context(context());
    assert_eq!(
        resolve_one(identifier, &data, &environment()),
        Err(missing("key"))
    );
    let data = data.with_private_key("owner", vec![0x11]);
    assert_eq!(
        resolve_one(identifier, &data, &environment()),
        Err(missing("sha256"))
    );
    let environment = environment().with_sha256(Arc::new(FakeSha256));
    assert_eq!(
        resolve_one(identifier, &data, &environment),
        Err(missing("secp256k1"))
    );
    assert_eq!(
        resolve_one("owner.signature.some_outputs", &data, &environment),
        Err(ResolutionError::UnknownSigningAlgorithm {
            identifier: "owner.signature.some_outputs".to_string(),
            algorithm: "some_outputs".to_string(),
        })
    );
}

#[test]
fn test_signature_appends_sighash_type() {
    let data = CompilationData::new()
        .with_transaction_context(context())
        .with_private_key("owner", vec![0x11]);
    let environment = environment()
        .with_sha256(Arc::new(FakeSha256))
        .with_secp256k1(Arc::new(FakeSecp256k1));

    let digest = signing_serialization_digest(
        &context(),
        SigningAlgorithm::CorrespondingOutput,
        &FakeSha256,
    );
    let mut expected = vec![0x30];
    expected.extend(&digest[..4]);
    expected.push(0x43);
    assert_eq!(
        resolve_one("owner.signature.corresponding_output", &data, &environment)
            .unwrap()
            .bytecode,
        expected
    );

    let schnorr = resolve_one(
        "owner.schnorr_signature.no_outputs_single_input",
        &data,
        &environment,
    )
    .unwrap()
    .bytecode;
    assert_eq!(schnorr[0], 0x5c);
    assert_eq!(schnorr.last(), Some(&0xc2));
}

#[test]
fn test_sighash_types() {
    let types = [
        ("all_outputs", 0x41),
        ("all_outputs_single_input", 0xc1),
        ("corresponding_output", 0x43),
        ("corresponding_output_single_input", 0xc3),
        ("no_outputs", 0x42),
        ("no_outputs_single_input", 0xc2),
    ];
    for (name, sighash) in types {
        let algorithm = name.parse::<SigningAlgorithm>().unwrap();
        assert_eq!(algorithm.sighash_type(), sighash, "{name}");
    }
    assert!("everything".parse::<SigningAlgorithm>().is_err());
}

#[test]
fn test_signing_serialization_layout() {
    let context = context();
    let serialization =
        generate_signing_serialization(&context, SigningAlgorithm::AllOutputs, &FakeSha256);
    assert_eq!(serialization.len(), 159);
    assert_eq!(&serialization[..4], &[0x02, 0x00, 0x00, 0x00]);
    assert_eq!(&serialization[68..100], &[0xab; 32]);
    assert_eq!(&serialization[100..104], &[0x01, 0x00, 0x00, 0x00]);
    assert_eq!(&serialization[104..107], &[0x02, 0x51, 0x87]);
    assert_eq!(&serialization[155..], &[0x41, 0x00, 0x00, 0x00]);
    assert_ne!(&serialization[4..36], &[0u8; 32]);
    assert_ne!(&serialization[36..68], &[0u8; 32]);

    let single_input = generate_signing_serialization(
        &context,
        SigningAlgorithm::NoOutputsSingleInput,
        &FakeSha256,
    );
    assert_eq!(&single_input[4..36], &[0u8; 32]);
    assert_eq!(&single_input[36..68], &[0u8; 32]);
    assert_eq!(&single_input[119..151], &[0u8; 32]);
}

#[test]
fn test_compact_size() {
    assert_eq!(compact_size(0xfc), vec![0xfc]);
    assert_eq!(compact_size(0xfd), vec![0xfd, 0xfd, 0x00]);
    assert_eq!(compact_size(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
}
