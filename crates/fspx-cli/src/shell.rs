//! The interactive/script shell.
//!
//! Line-oriented command interpreter over a compilation session: analyses on
//! demand, shell variables capturing command results, `if/elif/else/fi`
//! conditionals and an interactive simulation walk. Process names follow the
//! extended syntax `Base` or `Base(1,2)` and demand-translate on first use.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{BufRead, Write as _};
use std::rc::Rc;

use fspx_compiler::Driver;
use fspx_core::ActionSet;
use fspx_lts::Lts;

use crate::shexpr;

struct IfFrame {
    accepting: bool,
    accepted: bool,
    else_met: bool,
}

pub struct Shell {
    driver: Driver,
    input: Box<dyn BufRead>,
    interactive: bool,
    variables: HashMap<String, i64>,
    ifframes: Vec<IfFrame>,
    return_value: i64,
}

impl Shell {
    pub fn new(driver: Driver, input: Box<dyn BufRead>, interactive: bool) -> Self {
        Self {
            driver,
            input,
            interactive,
            variables: HashMap::new(),
            ifframes: vec![IfFrame {
                accepting: true,
                accepted: false,
                else_met: false,
            }],
            return_value: 0,
        }
    }

    pub fn run(&mut self) -> i64 {
        loop {
            if self.interactive {
                print!("fspx >> ");
                let _ = std::io::stdout().flush();
            }

            let Some(line) = self.read_line() else {
                return 0;
            };
            let mut tokens: Vec<String> =
                line.split_whitespace().map(|t| t.to_owned()).collect();
            if tokens.is_empty() {
                continue;
            }

            // `VAR = command args` captures the command's result.
            let mut var = None;
            if tokens.len() >= 3 && tokens[1] == "=" {
                var = Some(tokens.remove(0));
                tokens.remove(0);
            }

            let cmd = tokens.remove(0);
            let args = tokens;

            // `quit` is never filtered by conditionals.
            if cmd == "quit" {
                return 0;
            }

            let branching = matches!(cmd.as_str(), "if" | "elif" | "else" | "fi");
            if !self.ifframes.last().expect("if stack").accepting && !branching {
                continue;
            }

            let mut out = String::new();
            let ret = self.dispatch(&cmd, &args, &mut out);
            print!("{out}");
            let _ = std::io::stdout().flush();

            if let Some(var) = var {
                self.variables.insert(var, ret);
            }
            if cmd == "exit" {
                return self.return_value;
            }
        }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(_) => None,
        }
    }

    fn eval_shexpr(&self, args: &[String], out: &mut String) -> Option<i64> {
        let expression = args.join(" ");
        match shexpr::eval(&expression, |name| self.variables.get(name).copied()) {
            Ok(value) => Some(value),
            Err(msg) => {
                let _ = writeln!(out, "    invalid expression '{expression}': {msg}");
                None
            }
        }
    }

    fn dispatch(&mut self, cmd: &str, args: &[String], out: &mut String) -> i64 {
        match cmd {
            "ls" => self.cmd_ls(out),
            "safety" => self.cmd_safety(args, out),
            "progress" => self.cmd_progress(args, out),
            "simulate" => self.cmd_simulate(args, out),
            "alpha" => self.cmd_alpha(args, out),
            "print" => self.cmd_print(args, out),
            "lsprop" => self.cmd_lsprop(out),
            "lsmenu" => self.cmd_lsmenu(out),
            "minimize" => self.cmd_minimize(args, out),
            "traces" => self.cmd_traces(args, out),
            "basic" => self.cmd_basic(args, out),
            "graphviz" => self.cmd_graphviz(args, out),
            "printvar" => self.cmd_printvar(args, out),
            "if" => self.cmd_if(args, out),
            "elif" => self.cmd_elif(args, out),
            "else" => self.cmd_else(args, out),
            "fi" => self.cmd_fi(args, out),
            "exit" => self.cmd_exit(args, out),
            "help" => self.cmd_help(out),
            _ => {
                let _ = writeln!(out, "    Unrecognized command, try 'help'");
                -1
            }
        }
    }

    /// Demand-translates and returns the process `name` denotes.
    fn lookup_lts(&mut self, name: &str, out: &mut String) -> Option<Rc<Lts>> {
        match self.driver.get_lts(name, true) {
            Ok(Some(lts)) => Some(lts),
            Ok(None) => {
                let _ = writeln!(out, "    Process {name} not found");
                None
            }
            Err(e) => {
                let _ = writeln!(out, "    {e}");
                None
            }
        }
    }

    fn cmd_ls(&mut self, out: &mut String) -> i64 {
        let _ = writeln!(out, "Processes:");
        for (name, lts) in &self.driver.processes {
            let _ = writeln!(
                out,
                "    {name}: {} states, {} transitions",
                lts.num_states(),
                lts.num_transitions()
            );
        }
        for (name, _) in self.driver.parametric.iter() {
            if !self
                .driver
                .processes
                .keys()
                .any(|k| k == name || k.starts_with(&format!("{name}(")))
            {
                let _ = writeln!(out, "    {name} (not translated)");
            }
        }
        0
    }

    fn cmd_safety(&mut self, args: &[String], out: &mut String) -> i64 {
        let mut count = 0usize;
        if let Some(name) = args.first() {
            let Some(lts) = self.lookup_lts(name, out) else {
                return -1;
            };
            count += lts.deadlock_analysis(&self.driver.actions, out);
        } else {
            for (_, lts) in &self.driver.processes {
                count += lts.deadlock_analysis(&self.driver.actions, out);
            }
        }
        let _ = writeln!(out, "    {count} deadlocks/errors found");
        count as i64
    }

    fn cmd_progress(&mut self, args: &[String], out: &mut String) -> i64 {
        let targets: Vec<String> = if let Some(name) = args.first() {
            let Some(lts) = self.lookup_lts(name, out) else {
                return -1;
            };
            vec![lts.name.clone()]
        } else {
            self.driver.processes.keys().cloned().collect()
        };

        let properties: Vec<(String, fspx_core::ProgressSpec)> = self
            .driver
            .progresses
            .iter()
            .map(|(n, p)| (n.to_owned(), p.clone()))
            .collect();

        let mut count = 0usize;
        for target in &targets {
            let Some(rc) = self.driver.processes.get_mut(target) else {
                continue;
            };
            let lts = Rc::make_mut(rc);
            for (prop_name, prop) in &properties {
                count += lts.progress(prop_name, prop, &self.driver.actions, out);
            }
        }
        let _ = writeln!(out, "    {count} progress violations found");
        count as i64
    }

    fn cmd_simulate(&mut self, args: &[String], out: &mut String) -> i64 {
        let Some(name) = args.first() else {
            let _ = writeln!(out, "    Invalid command: try 'help'");
            return -1;
        };
        let menu: Option<ActionSet> = match args.get(1) {
            Some(menu_name) => match self.driver.menus.lookup(menu_name) {
                Some(m) => Some(m.clone()),
                None => {
                    let _ = writeln!(out, "    Menu {menu_name} not found");
                    return -1;
                }
            },
            None => None,
        };
        let Some(lts) = self.lookup_lts(name, out) else {
            return -1;
        };
        if lts.num_states() == 0 {
            let _ = writeln!(out, "    Cannot simulate an empty LTS.");
            return -1;
        }

        let mut state = 0u32;
        let mut trace: Vec<u32> = Vec::new();
        loop {
            if !trace.is_empty() {
                let _ = writeln!(out, "    Current trace:");
                let _ = write!(out, "        ");
                for (i, action) in trace.iter().enumerate() {
                    if i > 0 {
                        let _ = write!(out, " -> ");
                    }
                    let _ = write!(out, "{}", self.driver.actions.name(*action));
                }
                let _ = writeln!(out);
            }

            let actions = lts.eligible_actions(state);
            let (user, system): (Vec<u32>, Vec<u32>) = actions
                .iter()
                .copied()
                .partition(|a| menu.as_ref().is_none_or(|m| m.contains(*a)));

            if user.is_empty() && system.is_empty() {
                let _ = writeln!(out, "    Simulation done.");
                return 0;
            }

            let _ = writeln!(out, "    Eligible actions:");
            for (i, action) in user.iter().enumerate() {
                let _ = writeln!(out, "        ({}) {}", i + 1, self.driver.actions.name(*action));
            }
            let mut choices = user.len();
            if !system.is_empty() {
                choices += 1;
                let _ = writeln!(out, "        ({choices}) system choice");
            }
            let _ = write!(out, "    Your choice ('q' to quit): ");

            print!("{out}");
            out.clear();
            let _ = std::io::stdout().flush();

            let Some(line) = self.read_line() else {
                return 0;
            };
            let choice = line.trim();
            if choice.starts_with('q') {
                return 0;
            }
            let Ok(idx) = choice.parse::<usize>() else {
                let _ = writeln!(out, "        Invalid choice\n");
                continue;
            };
            if idx < 1 || idx > choices {
                let _ = writeln!(out, "        Invalid choice\n");
                continue;
            }

            let action = if idx <= user.len() {
                user[idx - 1]
            } else {
                system[0]
            };
            // Non-determinism resolves to the first destination.
            state = lts.step(state, action).expect("eligible action has an edge");
            trace.push(action);
            let _ = writeln!(out);
        }
    }

    fn cmd_alpha(&mut self, args: &[String], out: &mut String) -> i64 {
        let Some(name) = args.first() else {
            let _ = writeln!(out, "    Invalid command: try 'help'");
            return -1;
        };
        let Some(lts) = self.lookup_lts(name, out) else {
            return -1;
        };
        let _ = write!(out, "    Alphabet: {{");
        for (i, id) in lts.alphabet().iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ", ");
            }
            let _ = write!(out, "{}", self.driver.actions.name(*id));
        }
        let _ = writeln!(out, "}}");
        0
    }

    fn cmd_print(&mut self, args: &[String], out: &mut String) -> i64 {
        let Some(name) = args.first() else {
            let _ = writeln!(out, "    Invalid command: try 'help'");
            return -1;
        };
        let Some(lts) = self.lookup_lts(name, out) else {
            return -1;
        };
        lts.describe(&self.driver.actions, out);
        0
    }

    fn cmd_lsprop(&mut self, out: &mut String) -> i64 {
        let _ = writeln!(out, "Progress properties:");
        for (name, _) in self.driver.progresses.iter() {
            let _ = writeln!(out, "    {name}");
        }
        0
    }

    fn cmd_lsmenu(&mut self, out: &mut String) -> i64 {
        let _ = writeln!(out, "Menus:");
        for (name, menu) in self.driver.menus.iter() {
            let labels = menu.to_label_set(&self.driver.actions);
            let _ = writeln!(out, "    {name} = {labels}");
        }
        0
    }

    fn cmd_minimize(&mut self, args: &[String], out: &mut String) -> i64 {
        let Some(name) = args.first() else {
            let _ = writeln!(out, "    Invalid command: try 'help'");
            return -1;
        };
        let Some(rc) = self.lookup_lts(name, out) else {
            return -1;
        };
        let full = rc.name.clone();
        drop(rc);
        let entry = self.driver.processes.get_mut(&full).expect("published process");
        let lts = Rc::make_mut(entry);
        lts.minimize();
        let _ = writeln!(
            out,
            "    {full}: minimized to {} states, {} transitions",
            lts.num_states(),
            lts.num_transitions()
        );
        0
    }

    fn cmd_traces(&mut self, args: &[String], out: &mut String) -> i64 {
        let Some(name) = args.first() else {
            let _ = writeln!(out, "    Invalid command: try 'help'");
            return -1;
        };
        let Some(lts) = self.lookup_lts(name, out) else {
            return -1;
        };
        lts.traces(&self.driver.actions, out);
        0
    }

    fn cmd_basic(&mut self, args: &[String], out: &mut String) -> i64 {
        let (Some(name), Some(file)) = (args.first(), args.get(1)) else {
            let _ = writeln!(out, "    Invalid command: try 'help'");
            return -1;
        };
        let Some(lts) = self.lookup_lts(name, out) else {
            return -1;
        };
        let text = lts.basic(&self.driver.actions);
        if let Err(e) = std::fs::write(file, text) {
            let _ = writeln!(out, "    {file}: {e}");
            return -1;
        }
        0
    }

    fn cmd_graphviz(&mut self, args: &[String], out: &mut String) -> i64 {
        let Some(name) = args.first() else {
            let _ = writeln!(out, "    Invalid command: try 'help'");
            return -1;
        };
        let Some(lts) = self.lookup_lts(name, out) else {
            return -1;
        };
        let file = match args.get(1) {
            Some(f) => f.clone(),
            None => format!("{}.gv", lts.name),
        };
        if let Err(e) = std::fs::write(&file, lts.graphviz(&self.driver.actions)) {
            let _ = writeln!(out, "    {file}: {e}");
            return -1;
        }
        0
    }

    fn cmd_printvar(&mut self, args: &[String], out: &mut String) -> i64 {
        if let Some(name) = args.first() {
            match self.variables.get(name) {
                Some(value) => {
                    let _ = writeln!(out, "    {name} = {value}");
                    0
                }
                None => {
                    let _ = writeln!(out, "    Variable {name} undefined");
                    -1
                }
            }
        } else {
            let _ = writeln!(out, "Defined variables:");
            let mut names: Vec<&String> = self.variables.keys().collect();
            names.sort();
            for name in names {
                let _ = writeln!(out, "    {name} = {}", self.variables[name]);
            }
            0
        }
    }

    fn cmd_if(&mut self, args: &[String], out: &mut String) -> i64 {
        if !self.ifframes.last().expect("if stack").accepting {
            // Not accepting: push a frame that pretends it already accepted,
            // so no nested branch ever runs.
            self.ifframes.push(IfFrame {
                accepting: false,
                accepted: true,
                else_met: false,
            });
            return 0;
        }
        let Some(cond) = self.eval_shexpr(args, out) else {
            return -1;
        };
        self.ifframes.push(IfFrame {
            accepting: cond != 0,
            accepted: cond != 0,
            else_met: false,
        });
        0
    }

    fn cmd_elif(&mut self, args: &[String], out: &mut String) -> i64 {
        if self.ifframes.len() == 1 || self.ifframes.last().expect("if stack").else_met {
            let _ = writeln!(out, "    Error: unmatched 'elif'");
            return -1;
        }
        let top = self.ifframes.last_mut().expect("if stack");
        if top.accepted {
            top.accepting = false;
            return 0;
        }
        let Some(cond) = self.eval_shexpr(args, out) else {
            return -1;
        };
        let top = self.ifframes.last_mut().expect("if stack");
        top.accepting = cond != 0;
        top.accepted = cond != 0;
        0
    }

    fn cmd_else(&mut self, args: &[String], out: &mut String) -> i64 {
        if !args.is_empty() {
            let _ = writeln!(out, "    This command takes no arguments");
            return -1;
        }
        if self.ifframes.len() == 1 || self.ifframes.last().expect("if stack").else_met {
            let _ = writeln!(out, "    Error: unmatched 'else'");
            return -1;
        }
        let top = self.ifframes.last_mut().expect("if stack");
        top.accepting = !top.accepted;
        top.accepted = true;
        top.else_met = true;
        0
    }

    fn cmd_fi(&mut self, args: &[String], out: &mut String) -> i64 {
        if !args.is_empty() {
            let _ = writeln!(out, "    This command takes no arguments");
            return -1;
        }
        if self.ifframes.len() == 1 {
            let _ = writeln!(out, "    Error: unmatched 'fi'");
            return -1;
        }
        self.ifframes.pop();
        0
    }

    fn cmd_exit(&mut self, args: &[String], out: &mut String) -> i64 {
        self.return_value = 0;
        if !args.is_empty() {
            let Some(value) = self.eval_shexpr(args, out) else {
                return -1;
            };
            self.return_value = value;
        }
        0
    }

    #[cfg(test)]
    fn variables(&self) -> &HashMap<String, i64> {
        &self.variables
    }

    fn cmd_help(&mut self, out: &mut String) -> i64 {
        let _ = writeln!(out, "Available commands:");
        for synopsis in [
            "ls                      list processes",
            "safety [NAME]           deadlock/property analysis",
            "progress [NAME]         progress analysis",
            "simulate NAME [MENU]    interactive simulation",
            "alpha NAME              print the alphabet",
            "print NAME              print states and transitions",
            "lsprop                  list progress properties",
            "lsmenu                  list menus",
            "minimize NAME           minimize up to weak bisimulation",
            "traces NAME             enumerate loop-free traces",
            "basic NAME FILE         re-emit as a basic FSP definition",
            "graphviz NAME [FILE]    emit a GraphViz graph",
            "printvar [NAME]         show shell variables",
            "if/elif/else/fi EXPR    conditional execution",
            "exit [EXPR]             leave with a result value",
            "quit                    leave immediately",
        ] {
            let _ = writeln!(out, "    {synopsis}");
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::io::Cursor;

    fn shell_for(source: &str, script: &str) -> Shell {
        let driver = fspx_compiler::compile(source, 100, true).expect("source compiles");
        Shell::new(
            driver,
            Box::new(Cursor::new(script.as_bytes().to_vec())),
            false,
        )
    }

    #[test]
    fn safety_result_feeds_conditionals() {
        let script = indoc! {"
            v = safety P
            if v == 1
            exit 42
            fi
            exit 7
        "};
        let mut shell = shell_for("P = (a -> b -> STOP).", script);
        assert_eq!(shell.run(), 42);
        assert_eq!(shell.variables().get("v"), Some(&1));
    }

    #[test]
    fn else_branch_runs_when_condition_fails() {
        let script = indoc! {"
            v = safety Q
            if v != 0
            exit 1
            else
            exit 0
            fi
        "};
        let mut shell = shell_for("Q = (a -> END).", script);
        assert_eq!(shell.run(), 0);
    }

    #[test]
    fn composite_translates_on_demand() {
        let source = indoc! {"
            P = (a -> P).
            ||S = P.
        "};
        let mut shell = shell_for(source, "");
        let mut out = String::new();
        let ret = shell.dispatch("safety", &["S".to_owned()], &mut out);
        assert_eq!(ret, 0);
        assert!(shell.driver.processes.contains_key("S"));
    }

    #[test]
    fn unknown_command_reports() {
        let mut shell = shell_for("P = (a -> P).", "");
        let mut out = String::new();
        assert_eq!(shell.dispatch("frobnicate", &[], &mut out), -1);
        assert!(out.contains("Unrecognized"));
    }

    #[test]
    fn quit_is_never_filtered() {
        let script = indoc! {"
            if 0
            quit
            fi
            exit 9
        "};
        let mut shell = shell_for("P = (a -> P).", script);
        // `quit` inside a dead branch still terminates the shell.
        assert_eq!(shell.run(), 0);
    }
}
