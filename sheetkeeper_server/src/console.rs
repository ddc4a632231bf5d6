// Interactive line-oriented console for players.
//
// Generic over its input and output so the binary can drive it from
// stdin/stdout and tests can feed it a script. Commands are matched
// case-insensitively:
//
//   auth   re-authenticate under another name
//   pick   list unowned characters, then claim one (or a new name)
//   view   print the assigned character's sheet
//   set    edit the assigned character (see below)
//   help   print the command list
//   quit   close the connection (also `exit`, `q`, or end of input)
//
// `set` fetches the record and enters an edit loop that modifies it
// locally: stat / save / skill / class / level / max health / health /
// heal / harm. `done` sends the edited record to the server, `undo` throws
// it away. Nothing is stored until `done`.
//
// Refusals from the server are printed and the console keeps going; a
// broken connection ends `run` with an error.

use std::io::{BufRead, Write};

use sheetkeeper_protocol::message::PREVIOUS_CHARACTER_PREFIX;
use sheetkeeper_sheet::CharacterRecord;

use crate::client::{CampaignClient, ClientError};

const HELP: &str = "\
The following commands are available:
auth - re-authenticate
pick - pick a character
view - view a character sheet
set - set a value in a character sheet
help - print this message
quit - leave";

const SET_HELP: &str = "\
Enter:
stat - to set stat, save - to set save proficiency, skill - to set skill proficiency
class - to set class, level - to set level, max health - to set max health
health - to set current health, heal - to add to current health, harm - to subtract from current health
Enter 'done' to stop setting values and save the result
Enter 'undo' to stop setting values and discard the result";

enum Flow {
    Continue,
    Quit,
}

pub struct Console<R, W> {
    client: CampaignClient,
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(client: CampaignClient, input: R, output: W) -> Self {
        Self {
            client,
            input,
            output,
        }
    }

    /// Authenticate, then process commands until the player quits or the
    /// input ends. Closes the connection on the way out.
    pub fn run(mut self) -> Result<(), ClientError> {
        let authenticated = self.authenticate();
        if let Flow::Continue = self.report_refusal(authenticated)? {
            writeln!(self.output, "{HELP}")?;
            while let Some(line) = self.read_line()? {
                writeln!(self.output, "---------------------------------")?;
                if let Flow::Quit = self.dispatch(&line.to_lowercase())? {
                    break;
                }
            }
        }
        self.output.flush()?;
        self.client.close()
    }

    fn dispatch(&mut self, command: &str) -> Result<Flow, ClientError> {
        let outcome = match command {
            "auth" => self.authenticate(),
            "pick" => self.pick(),
            "view" => self.view(),
            "set" => self.set(),
            "help" => {
                writeln!(self.output, "{HELP}")?;
                Ok(Flow::Continue)
            }
            "quit" | "exit" | "q" => Ok(Flow::Quit),
            _ => {
                writeln!(self.output, "Unknown command")?;
                Ok(Flow::Continue)
            }
        };
        self.report_refusal(outcome)
    }

    /// Print a server refusal and carry on; anything else is fatal.
    fn report_refusal(&mut self, outcome: Result<Flow, ClientError>) -> Result<Flow, ClientError> {
        match outcome {
            Err(ClientError::Rejected(reason)) => {
                writeln!(self.output, "An error occurred: {reason}")?;
                Ok(Flow::Continue)
            }
            other => other,
        }
    }

    fn authenticate(&mut self) -> Result<Flow, ClientError> {
        let Some(player) = self.prompt("Enter your player name...")? else {
            return Ok(Flow::Quit);
        };
        let previous = self.client.auth(&player)?;
        writeln!(self.output, "Authenticated successfully")?;
        if let Some(character) = previous {
            writeln!(self.output, "{PREVIOUS_CHARACTER_PREFIX}{character}")?;
        }
        Ok(Flow::Continue)
    }

    fn pick(&mut self) -> Result<Flow, ClientError> {
        let unowned = self.client.list()?;
        writeln!(self.output, "{}", unowned.join("\n"))?;
        let Some(name) = self.prompt(
            "Enter the name of one of the characters above to choose them or a new name, to create a new character.",
        )?
        else {
            return Ok(Flow::Quit);
        };
        self.client.pick(&name)?;
        writeln!(self.output, "You have been assigned a character {name}")?;
        Ok(Flow::Continue)
    }

    fn view(&mut self) -> Result<Flow, ClientError> {
        let sheet = self.client.view()?;
        writeln!(self.output, "{sheet}")?;
        Ok(Flow::Continue)
    }

    fn set(&mut self) -> Result<Flow, ClientError> {
        let mut record = self.client.begin_edit()?;
        writeln!(self.output, "Character received successfully")?;
        writeln!(self.output, "{SET_HELP}")?;

        loop {
            let Some(line) = self.read_line()? else {
                self.client.discard_edit()?;
                return Ok(Flow::Quit);
            };
            match line.to_lowercase().as_str() {
                "done" => {
                    self.client.commit_edit(&record)?;
                    writeln!(self.output, "Character saved")?;
                    return Ok(Flow::Continue);
                }
                "undo" => {
                    self.client.discard_edit()?;
                    writeln!(self.output, "Changes discarded")?;
                    return Ok(Flow::Continue);
                }
                field => {
                    if !self.edit_field(&mut record, field)? {
                        self.client.discard_edit()?;
                        return Ok(Flow::Quit);
                    }
                }
            }
        }
    }

    /// Apply one edit command to the local copy. Returns `false` if the
    /// input ended mid-command.
    fn edit_field(&mut self, record: &mut CharacterRecord, field: &str) -> Result<bool, ClientError> {
        let result = match field {
            "stat" => match self.prompt_named("stat")? {
                Some((name, value)) => record.set_stat_value(&name, value),
                None => return Ok(false),
            },
            "save" => match self.prompt_named("save")? {
                Some((name, value)) => record.set_save_proficiency(&name, value),
                None => return Ok(false),
            },
            "skill" => match self.prompt_named("skill")? {
                Some((name, value)) => record.set_skill_proficiency(&name, value),
                None => return Ok(false),
            },
            "class" => match self.prompt("Enter class")? {
                Some(class) => {
                    record.set_character_class(class.to_lowercase());
                    Ok(())
                }
                None => return Ok(false),
            },
            "level" => match self.prompt_number("Enter level")? {
                Some(level) => {
                    record.set_level(level);
                    Ok(())
                }
                None => return Ok(false),
            },
            "max health" => match self.prompt_number("Enter new max health")? {
                Some(hp) => {
                    record.set_max_hp(hp);
                    Ok(())
                }
                None => return Ok(false),
            },
            "health" => match self.prompt_number("Enter new current health")? {
                Some(hp) => {
                    record.set_current_hp(hp);
                    Ok(())
                }
                None => return Ok(false),
            },
            "heal" => match self.prompt_number("Enter amount to heal")? {
                Some(amount) => {
                    record.apply_heal(amount);
                    Ok(())
                }
                None => return Ok(false),
            },
            "harm" => match self.prompt_number("Enter amount to harm")? {
                Some(amount) => {
                    record.apply_damage(amount);
                    Ok(())
                }
                None => return Ok(false),
            },
            _ => {
                writeln!(self.output, "Unknown command")?;
                Ok(())
            }
        };
        if let Err(e) = result {
            writeln!(self.output, "{e}")?;
        }
        Ok(true)
    }

    // -- Line input ---------------------------------------------------------

    /// Ask for a stat or skill name and then a value.
    fn prompt_named(&mut self, what: &str) -> Result<Option<(String, i32)>, ClientError> {
        let Some(name) = self.prompt(&format!("Enter {what}"))? else {
            return Ok(None);
        };
        let Some(value) = self.prompt_number("Enter value")? else {
            return Ok(None);
        };
        Ok(Some((name.trim().to_lowercase(), value)))
    }

    fn prompt(&mut self, text: &str) -> Result<Option<String>, ClientError> {
        writeln!(self.output, "{text}")?;
        self.output.flush()?;
        self.read_line()
    }

    /// Prompt until the player enters an integer.
    fn prompt_number(&mut self, text: &str) -> Result<Option<i32>, ClientError> {
        loop {
            let Some(line) = self.prompt(text)? else {
                return Ok(None);
            };
            match line.trim().parse() {
                Ok(number) => return Ok(Some(number)),
                Err(_) => writeln!(self.output, "Not a number: {line}")?,
            }
        }
    }

    fn read_line(&mut self) -> Result<Option<String>, ClientError> {
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_owned()))
    }
}
