//! Binding of macro-call argument groups to formal parameters.

use super::error::SyntaxErrorReason;
use super::schema::{MacroSignature, ValueTable};
use super::syntax::{Argument, BoundParam, Call, Term, Unexpanded};

/// Bind the argument groups of `call` to the parameters of `signature`.
///
/// A group that is a single bare word naming a keyword parameter switches
/// the following groups to that keyword until the next keyword. Other groups
/// fill positional parameters in order, one group each, and overflow into
/// the variadic parameter when one is declared. Bare words that are not
/// keywords become literals.
///
/// # Errors
///
/// Returns [`SyntaxErrorReason::TooManyPositional`] when positional groups
/// overflow a signature without a variadic parameter, or
/// [`SyntaxErrorReason::IdOverflow`] when a literal cannot be interned.
pub fn bind(
    call: Unexpanded,
    signature: &MacroSignature,
    values: &mut dyn ValueTable,
) -> Result<Call, SyntaxErrorReason> {
    let mut params: Vec<BoundParam> = signature
        .params()
        .iter()
        .map(|param| BoundParam {
            name: param.name.clone(),
            args: Vec::new(),
        })
        .collect();
    let mut positional = signature.positional_slots();
    let mut keyword: Option<usize> = None;

    for group in call.args {
        if let [Term::IdOrString { word }] = group.terms.as_slice()
            && let Some(slot) = signature.keyword_slot(word)
        {
            keyword = Some(slot);
            continue;
        }
        let group = resolve_words(group, values)?;
        let slot = match keyword {
            Some(slot) => slot,
            None => positional
                .next()
                .or_else(|| signature.variadic_slot())
                .ok_or_else(|| SyntaxErrorReason::TooManyPositional {
                    name: call.name.clone(),
                    max: signature.positional_slots().count(),
                })?,
        };
        if let Some(param) = params.get_mut(slot) {
            param.args.push(group);
        }
    }

    Ok(Call {
        name: call.name,
        params,
    })
}

fn resolve_words(group: Argument, values: &mut dyn ValueTable) -> Result<Argument, SyntaxErrorReason> {
    let terms = group
        .terms
        .into_iter()
        .map(|term| match term {
            Term::IdOrString { word } => Ok(Term::Const {
                id: values.insert_str(&word)?,
            }),
            other => Ok(other),
        })
        .collect::<Result<_, SyntaxErrorReason>>()?;
    Ok(Argument { terms })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, reason = "tests fail loudly on setup errors")]
    use super::*;
    use crate::command::schema::MacroValues;
    use rstest::{fixture, rstest};

    #[fixture]
    fn values() -> MacroValues {
        MacroValues::new()
    }

    fn word(text: &str) -> Argument {
        Argument::single(Term::IdOrString { word: text.into() })
    }

    fn var(values: &mut MacroValues, name: &str) -> Argument {
        Argument::single(Term::Var {
            id: values.insert_var(name).expect("fits"),
        })
    }

    fn group_counts(call: &Call) -> Vec<(String, usize)> {
        call.params
            .iter()
            .map(|param| (param.name.clone(), param.args.len()))
            .collect()
    }

    #[rstest]
    fn keyword_collects_following_groups(mut values: MacroValues) {
        let sig = MacroSignature::new(&["SRC", "OUT"], &["OUT"]).expect("sig");
        let args = vec![
            var(&mut values, "SRC"),
            word("OUT"),
            var(&mut values, "A"),
            var(&mut values, "B"),
        ];
        let call = bind(
            Unexpanded {
                name: "CC".into(),
                args,
            },
            &sig,
            &mut values,
        )
        .expect("bind");
        assert_eq!(
            group_counts(&call),
            vec![("SRC".into(), 1), ("OUT".into(), 2)]
        );
    }

    #[rstest]
    fn overflow_goes_to_variadic(mut values: MacroValues) {
        let sig = MacroSignature::new(&["FIRST", "REST[]"], &[] as &[&str]).expect("sig");
        let args = vec![word("a"), word("b"), word("c")];
        let call = bind(
            Unexpanded {
                name: "M".into(),
                args,
            },
            &sig,
            &mut values,
        )
        .expect("bind");
        assert_eq!(
            group_counts(&call),
            vec![("FIRST".into(), 1), ("REST".into(), 2)]
        );
        // Bare words that are not keywords become literals.
        let first = call.params.first().and_then(|p| p.args.first()).expect("arg");
        assert!(matches!(first.terms.as_slice(), [Term::Const { .. }]));
    }

    #[rstest]
    fn overflow_without_variadic_fails(mut values: MacroValues) {
        let sig = MacroSignature::new(&["ONLY"], &[] as &[&str]).expect("sig");
        let err = bind(
            Unexpanded {
                name: "M".into(),
                args: vec![word("a"), word("b")],
            },
            &sig,
            &mut values,
        )
        .expect_err("overflow");
        assert_eq!(
            err,
            SyntaxErrorReason::TooManyPositional {
                name: "M".into(),
                max: 1
            }
        );
    }
}
