//! Default handlers for the text-editing commands
//!
//! Registered at [`CommandPriority::Editor`] so any plugin can claim a
//! command first (the horizontal rule claims deletes of a selected rule,
//! lists claim paragraph breaks in empty items).

use folio_core::commands::{
    CONTROLLED_TEXT_INSERTION_COMMAND, DELETE_CHARACTER_COMMAND, FORMAT_TEXT_COMMAND,
    INSERT_LINE_BREAK_COMMAND, INSERT_PARAGRAPH_COMMAND, KEY_BACKSPACE_COMMAND, KEY_DELETE_COMMAND,
    REMOVE_TEXT_COMMAND,
};
use folio_core::editing;
use folio_core::{CommandPriority, Editor, Unregister};

pub fn register_rich_text(editor: &Editor) -> Vec<Unregister> {
    let priority = CommandPriority::Editor;
    vec![
        editor.register_command(
            &CONTROLLED_TEXT_INSERTION_COMMAND,
            |text, tx| {
                editing::insert_text(tx, text)?;
                Ok(true)
            },
            priority,
        ),
        editor.register_command(
            &DELETE_CHARACTER_COMMAND,
            |backward, tx| editing::delete_character(tx, *backward),
            priority,
        ),
        editor.register_command(
            &KEY_BACKSPACE_COMMAND,
            |_, tx| tx.dispatch_command(&DELETE_CHARACTER_COMMAND, true),
            priority,
        ),
        editor.register_command(
            &KEY_DELETE_COMMAND,
            |_, tx| tx.dispatch_command(&DELETE_CHARACTER_COMMAND, false),
            priority,
        ),
        editor.register_command(
            &REMOVE_TEXT_COMMAND,
            |_, tx| {
                editing::remove_text(tx)?;
                Ok(true)
            },
            priority,
        ),
        editor.register_command(
            &INSERT_PARAGRAPH_COMMAND,
            |_, tx| {
                editing::insert_paragraph(tx)?;
                Ok(true)
            },
            priority,
        ),
        editor.register_command(
            &INSERT_LINE_BREAK_COMMAND,
            |_, tx| {
                editing::insert_line_break(tx)?;
                Ok(true)
            },
            priority,
        ),
        editor.register_command(
            &FORMAT_TEXT_COMMAND,
            |format, tx| {
                editing::format_text(tx, *format)?;
                Ok(true)
            },
            priority,
        ),
    ]
}
