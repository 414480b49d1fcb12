use jose::{
    Headers, JWE, JWK, JWKEllipticCurves, JWKSet, JoseError, JweDecryptOptions, Pbes2Config,
};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn header(value: serde_json::Value) -> Headers {
    Headers::new().try_with_headers(value).unwrap()
}

#[test]
fn every_recipient_can_decrypt() {
    let rsa = JWK::generate_rsa(2048).unwrap().with_kid("rsa".to_owned());
    let ec = JWK::generate_ec(JWKEllipticCurves::P521)
        .unwrap()
        .with_kid("ec".to_owned());
    let oct = JWK::generate_oct(192).unwrap().with_kid("oct".to_owned());

    let mut jwe = JWE::new(
        "to everyone",
        header(json!({"enc": "A192CBC-HS384", "zip": "DEF"})),
        Headers::new(),
    )
    .try_with_external_aad("context")
    .unwrap();
    jwe.add_recipient(
        &rsa.public().unwrap(),
        header(json!({"alg": "RSA-OAEP-256", "kid": "rsa"})),
    )
    .unwrap();
    jwe.add_recipient(
        &ec.public().unwrap(),
        header(json!({"alg": "ECDH-ES+A192KW", "kid": "ec"})),
    )
    .unwrap();
    jwe.add_recipient(&oct, header(json!({"alg": "A192KW", "kid": "oct"})))
        .unwrap();
    assert_eq!(jwe.recipients().len(), 3);
    assert_err!(jwe.serialize(true));

    let general = jwe.serialize(false).unwrap();
    for key in [&rsa, &ec, &oct] {
        let mut received = JWE::deserialize(&general).unwrap();
        assert_ok!(received.decrypt(key));
        assert_eq!(received.plaintext(), Some(&b"to everyone"[..]));
        assert_eq!(received.external_aad(), Some(&b"context"[..]));
    }

    let keys: JWKSet = [oct.clone(), rsa.clone()].into_iter().collect();
    let mut received = JWE::deserialize(&general).unwrap();
    assert_ok!(received.decrypt(&keys));

    let mut received = JWE::deserialize(&general).unwrap();
    let stranger = JWK::generate_oct(192).unwrap().with_kid("oct".to_owned());
    assert_eq!(
        received.decrypt(&stranger),
        Err(JoseError::AuthenticationFailure)
    );
    assert_eq!(received.plaintext(), None);
}

#[test]
fn compact_form_has_one_recipient_and_no_aad() {
    let key = JWK::generate_oct(256).unwrap();

    let mut jwe = JWE::new("aad", header(json!({"alg": "dir", "enc": "A256GCM"})), Headers::new())
        .try_with_external_aad("not in compact")
        .unwrap();
    jwe.add_recipient(&key, Headers::new()).unwrap();
    assert!(matches!(
        jwe.serialize(true),
        Err(JoseError::InvalidOperation(_))
    ));

    let mut jwe = JWE::new(
        "unprotected",
        header(json!({"enc": "A256GCM"})),
        header(json!({"alg": "dir"})),
    );
    jwe.add_recipient(&key, Headers::new()).unwrap();
    assert!(matches!(
        jwe.serialize(true),
        Err(JoseError::InvalidOperation(_))
    ));
    let flattened = jwe.serialize(false).unwrap();
    let value: serde_json::Value = serde_json::from_str(&flattened).unwrap();
    assert!(value.get("recipients").is_none());
    assert_eq!(value["unprotected"]["alg"], "dir");
}

#[test]
fn pbes2_iterations_are_bounded_on_decrypt() {
    let password = JWK::new_oct(b"Thus from my lips, by yours, my sin is purged.".to_vec());
    let mut jwe = JWE::new(
        "password protected",
        header(json!({"alg": "PBES2-HS512+A256KW", "enc": "A256GCM", "p2c": 8192})),
        Headers::new(),
    );
    jwe.add_recipient(&password, Headers::new()).unwrap();
    let token = jwe.serialize(true).unwrap();

    let mut received = JWE::deserialize(&token).unwrap();
    assert_ok!(received.decrypt(&password));

    let strict = JweDecryptOptions::default()
        .with_pbes2(Pbes2Config::default().with_max_iterations(4096));
    let mut received = JWE::deserialize(&token).unwrap().with_options(strict);
    assert_err!(received.decrypt(&password));
}

#[test]
fn disallowed_algorithms_are_never_tried() {
    let rsa = JWK::generate_rsa(2048).unwrap();
    let mut jwe = JWE::new(
        "legacy",
        header(json!({"alg": "RSA1_5", "enc": "A128GCM"})),
        Headers::new(),
    );
    assert_eq!(
        jwe.add_recipient(&rsa.public().unwrap(), Headers::new())
            .map(|_| ()),
        Err(JoseError::AlgorithmNotAllowed("RSA1_5".to_owned()))
    );

    let mut jwe = JWE::new(
        "legacy",
        header(json!({"alg": "RSA1_5", "enc": "A128GCM"})),
        Headers::new(),
    )
    .with_options(
        JweDecryptOptions::default()
            .with_allowed_algs(vec!["RSA1_5".to_owned(), "A128GCM".to_owned()]),
    );
    jwe.add_recipient(&rsa.public().unwrap(), Headers::new())
        .unwrap();
    let token = jwe.serialize(true).unwrap();

    let mut received = JWE::deserialize(&token).unwrap();
    assert_eq!(
        received.decrypt(&rsa),
        Err(JoseError::AlgorithmNotAllowed("RSA1_5".to_owned()))
    );
}
