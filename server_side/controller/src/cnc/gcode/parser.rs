use {
    super::{GcodeArgs, NO_CODE},
    crate::cnc::state::MachineState,
    nom::{
        branch::alt,
        character::complete::{char, digit0, digit1, multispace0, one_of},
        combinator::{map_res, opt, recognize},
        sequence::{pair, preceded, tuple},
        IResult,
    },
    std::borrow::Cow,
};

/// Leading decimal number: optional sign, digits with an optional fraction or a bare
/// fraction, then an optional exponent. An `e` with no digits after it is not consumed.
fn parse_f64(input: &str) -> IResult<&str, f64> {
    map_res(
        preceded(
            multispace0,
            recognize(tuple((
                opt(one_of("+-")),
                alt((
                    recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                    recognize(pair(char('.'), digit1)),
                )),
                opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
            ))),
        ),
        |substr: &str| substr.parse::<f64>(),
    )(input)
}

/// The number following `letter`, taken from the first place the letter occurs anywhere
/// in the line.
///
/// The scan is positional, not per word: `X` inside an unrelated token is matched too.
/// A letter followed by no number reads as 0.
pub fn word_value(line: &str, letter: char) -> Option<f64> {
    let position = line.find(letter)?;
    let rest = &line[position + letter.len_utf8()..];
    Some(parse_f64(rest).map_or(0.0, |(_, value)| value))
}

/// Payload text, ending at the first NUL byte.
pub fn payload_text(payload: &[u8]) -> Cow<'_, str> {
    let end = payload.iter().position(|b| *b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end])
}

/// Resolves every argument word, falling back to the machine state for X, Y and F.
pub fn parse_gcode_args(payload: &[u8], state: &MachineState) -> GcodeArgs {
    let line = payload_text(payload);
    let x = word_value(&line, 'X');
    let y = word_value(&line, 'Y');
    let g = word_value(&line, 'G')
        .filter(|value| value.is_finite())
        .map_or(NO_CODE, |value| value.trunc() as i32);
    GcodeArgs {
        x: x.unwrap_or(state.position.x),
        y: y.unwrap_or(state.position.y),
        x_given: x.is_some(),
        y_given: y.is_some(),
        i: word_value(&line, 'I').unwrap_or(0.0),
        j: word_value(&line, 'J').unwrap_or(0.0),
        f: word_value(&line, 'F').unwrap_or(state.feed_rate),
        g,
    }
}
